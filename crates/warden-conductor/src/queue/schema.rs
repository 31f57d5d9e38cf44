use serde::{Deserialize, Serialize};
use warden_core::{Priority, Task};

/// A named batch of tasks handed to one session.
#[derive(Debug, Clone, Serialize)]
pub struct Queue {
    pub name: String,
    /// Prepended to every task prompt, after the session config's sections.
    pub context: Vec<ContextSection>,
    pub tasks: Vec<Task>,
}

/// A block of prompt context. In YAML either a plain string or
/// `{ title, body }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawSection")]
pub struct ContextSection {
    pub title: Option<String>,
    pub body: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSection {
    Text(String),
    Titled {
        #[serde(default)]
        title: Option<String>,
        body: String,
    },
}

impl From<RawSection> for ContextSection {
    fn from(raw: RawSection) -> Self {
        match raw {
            RawSection::Text(body) => Self { title: None, body },
            RawSection::Titled { title, body } => Self { title, body },
        }
    }
}

impl ContextSection {
    pub fn render(&self) -> String {
        match self.title.as_deref().filter(|t| !t.is_empty()) {
            Some(title) => format!("## {title}\n{}", self.body.trim_end()),
            None => self.body.trim_end().to_string(),
        }
    }
}

/// One task as written in the queue file, before ids are assigned.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TaskEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub prompt: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub priority: Priority,
}

impl TaskEntry {
    pub(crate) fn into_task(self, id: String) -> Task {
        let mut task = Task::new(id, self.prompt).with_priority(self.priority);
        task.description = self.description.unwrap_or_default();
        task.context = self.context.filter(|c| !c.trim().is_empty());
        task
    }
}
