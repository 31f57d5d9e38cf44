use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use warden_core::WardenError;

use crate::queue::schema::{ContextSection, Queue, TaskEntry};

/// Load a task queue from a YAML file. The file stem names the queue when
/// the file does not.
pub fn load_queue(path: &Path) -> Result<Queue> {
    let content = std::fs::read_to_string(path)
        .map_err(WardenError::from)
        .with_context(|| format!("reading {}", path.display()))?;
    let fallback = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("queue");
    parse_queue(&content, fallback)
}

/// Parse a queue from YAML.
///
/// Accepts either a mapping (`name`, `context`, `tasks`) or a bare task list.
/// Entries that are not mappings, lack a `prompt`, or reuse an id are skipped
/// with a warning; entries without an id get `task-<n>`.
pub fn parse_queue(yaml: &str, fallback_name: &str) -> Result<Queue> {
    let mut raw: serde_yml::Value = serde_yml::from_str(yaml)
        .map_err(|e| WardenError::Queue(e.to_string()))
        .context("invalid YAML syntax")?;
    expand_variables(&mut raw);

    let (name, context, entries) = match raw {
        serde_yml::Value::Sequence(seq) => (None, Vec::new(), seq),
        serde_yml::Value::Mapping(mut map) => {
            let name = map
                .remove("name")
                .and_then(|v| v.as_str().map(str::to_string));
            let context = match map.remove("context") {
                None | Some(serde_yml::Value::Null) => Vec::new(),
                Some(serde_yml::Value::Sequence(seq)) => sections(seq),
                Some(single) => sections(vec![single]),
            };
            let entries = match map.remove("tasks") {
                Some(serde_yml::Value::Sequence(seq)) => seq,
                None | Some(serde_yml::Value::Null) => Vec::new(),
                Some(other) => {
                    return Err(WardenError::Queue(format!(
                        "`tasks` must be a list, got: {other:?}"
                    ))
                    .into())
                }
            };
            (name, context, entries)
        }
        serde_yml::Value::Null => (None, Vec::new(), Vec::new()),
        other => {
            return Err(WardenError::Queue(format!(
                "queue must be a mapping or a list of tasks, got: {other:?}"
            ))
            .into())
        }
    };

    let mut seen = HashSet::new();
    let mut tasks = Vec::with_capacity(entries.len());
    for (i, value) in entries.into_iter().enumerate() {
        let n = i + 1;
        if !value.is_mapping() {
            tracing::warn!("skipping task #{n}: expected a mapping, got {value:?}");
            continue;
        }
        let entry: TaskEntry = match serde_yml::from_value(value) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("skipping task #{n}: {e}");
                continue;
            }
        };
        if entry.prompt.trim().is_empty() {
            tracing::warn!("skipping task #{n}: empty prompt");
            continue;
        }
        let id = entry
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("task-{n}"));
        if !seen.insert(id.clone()) {
            tracing::warn!("skipping task #{n}: duplicate id \"{id}\"");
            continue;
        }
        tasks.push(entry.into_task(id));
    }

    if tasks.is_empty() {
        tracing::warn!("queue contains no runnable tasks");
    }

    Ok(Queue {
        name: name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| fallback_name.to_string()),
        context,
        tasks,
    })
}

fn sections(values: Vec<serde_yml::Value>) -> Vec<ContextSection> {
    values
        .into_iter()
        .filter_map(|v| match serde_yml::from_value::<ContextSection>(v) {
            Ok(section) => Some(section),
            Err(e) => {
                tracing::warn!("skipping context section: {e}");
                None
            }
        })
        .collect()
}

/// Expand `${{ env.VAR_NAME }}` patterns in string values.
pub(crate) fn expand_variables(value: &mut serde_yml::Value) {
    match value {
        serde_yml::Value::String(s) => {
            if s.contains("${{") {
                *s = expand_env_vars(s);
            }
        }
        serde_yml::Value::Mapping(m) => {
            for (_, v) in m.iter_mut() {
                expand_variables(v);
            }
        }
        serde_yml::Value::Sequence(seq) => {
            for v in seq.iter_mut() {
                expand_variables(v);
            }
        }
        _ => {}
    }
}

/// Replace `${{ env.VAR_NAME }}` with the variable's value (empty if unset).
/// Unknown expressions and unclosed braces are kept verbatim.
fn expand_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find("${{") {
        result.push_str(&rest[..start]);
        let after_start = &rest[start + 3..];
        let Some(end) = after_start.find("}}") else {
            result.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let expr = after_start[..end].trim();
        match expr.strip_prefix("env.") {
            Some(var) => result.push_str(&std::env::var(var.trim()).unwrap_or_default()),
            None => result.push_str(&rest[start..start + 3 + end + 2]),
        }
        rest = &after_start[end + 2..];
    }
    result.push_str(rest);
    result
}
