//! Built-in pattern table, one entry per action type.
//!
//! Entry order is the tie-break order between types; pattern order within an
//! entry decides which pattern speaks for that type.

use warden_core::ActionType;

/// How a target string is pulled out of a pattern match.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Extract {
    /// A capture group. Fails if the group is missing or empty.
    Group(usize),
    /// A capture group, falling back to a fixed target when empty.
    GroupOr(usize, &'static str),
    /// The whole match.
    Whole,
}

pub(crate) struct PatternSpec {
    pub regex: &'static str,
    pub confidence: f64,
    pub extract: Extract,
}

pub(crate) struct RuleSpec {
    pub action_type: ActionType,
    pub patterns: &'static [PatternSpec],
}

const fn p(regex: &'static str, confidence: f64, extract: Extract) -> PatternSpec {
    PatternSpec {
        regex,
        confidence,
        extract,
    }
}

pub(crate) const RULES: &[RuleSpec] = &[
    RuleSpec {
        action_type: ActionType::FileDelete,
        patterns: &[
            p(
                r"(?i)\b(?:deleting|deleted|removing|removed)\s+(?:the\s+)?(?:file|directory|folder)s?:?\s+(\S+)",
                0.9,
                Extract::Group(1),
            ),
            p(
                r"\brm\s+(?:-{1,2}[a-zA-Z][a-zA-Z-]*\s+)*([^\s;&|]+)",
                0.8,
                Extract::Group(1),
            ),
            p(
                r"(?i)\b(?:deleting|deleted|removing|removed)\s+(\S+\.[a-z0-9]+)\b",
                0.7,
                Extract::Group(1),
            ),
        ],
    },
    RuleSpec {
        action_type: ActionType::FileEdit,
        patterns: &[
            p(
                r"(?i)\b(?:editing|edited|modifying|modified|updating|updated)\s+(?:the\s+)?file:?\s+(\S+)",
                0.9,
                Extract::Group(1),
            ),
            p(
                r"(?i)\bapplying\s+(?:a\s+)?(?:patch|edits?|changes?)\s+to\s+(\S+)",
                0.8,
                Extract::Group(1),
            ),
            p(
                r"(?i)\b(?:editing|edited|modifying|modified|updating|updated)\s+(\S+\.[a-z0-9]+)\b",
                0.75,
                Extract::Group(1),
            ),
        ],
    },
    RuleSpec {
        action_type: ActionType::FileCreate,
        patterns: &[
            p(
                r"(?i)\b(?:creating|created|writing|wrote)\s+(?:a\s+)?(?:new\s+)?file:?\s+(\S+)",
                0.9,
                Extract::Group(1),
            ),
            p(r"\btouch\s+([^\s;&|]+)", 0.75, Extract::Group(1)),
            p(
                r"(?i)\b(?:creating|created|writing|wrote)\s+(?:to\s+)?(\S+\.[a-z0-9]+)\b",
                0.7,
                Extract::Group(1),
            ),
        ],
    },
    RuleSpec {
        action_type: ActionType::GitPush,
        patterns: &[p(r"\bgit\s+push\b[^\n;&|]*", 0.95, Extract::Whole)],
    },
    RuleSpec {
        action_type: ActionType::GitCommit,
        patterns: &[p(r"\bgit\s+commit\b[^\n;&|]*", 0.9, Extract::Whole)],
    },
    RuleSpec {
        action_type: ActionType::NpmInstall,
        patterns: &[p(
            r"\b(?:npm|pnpm|yarn)\s+(?:install|i|add)\b([^\n;&|]*)",
            0.9,
            Extract::GroupOr(1, "package.json"),
        )],
    },
    RuleSpec {
        action_type: ActionType::PackageInstall,
        patterns: &[p(
            r"\b(?:pip3?|uv\s+pip|poetry|cargo|gem|go|brew|apt-get|apt)\s+(?:install|add|get)\b([^\n;&|]*)",
            0.85,
            Extract::GroupOr(1, "requirements"),
        )],
    },
    RuleSpec {
        action_type: ActionType::NetworkRequest,
        patterns: &[
            p(
                r#"\b(?:curl|wget|xh|http)\s+[^\n]*?(https?://[^\s'"|;]+)"#,
                0.85,
                Extract::Group(1),
            ),
            p(
                r#"(?i)\b(?:fetching|downloading|requesting|GET|POST|PUT)\s+(https?://[^\s'"]+)"#,
                0.75,
                Extract::Group(1),
            ),
        ],
    },
    RuleSpec {
        action_type: ActionType::CommandRun,
        patterns: &[
            p(
                r"(?i)\b(?:running|executing|ran|executed)\s+(?:the\s+)?(?:command|cmd)?:?\s*`([^`\n]+)`",
                0.85,
                Extract::Group(1),
            ),
            p(r"(?m)^\s*\$\s+(\S[^\n]*)", 0.8, Extract::Group(1)),
            p(
                r"(?i)\b(?:running|executing)\s+(?:command|cmd):?\s+([^\n]+)",
                0.7,
                Extract::Group(1),
            ),
        ],
    },
];

pub(crate) struct DangerSpec {
    pub regex: &'static str,
    pub reason: &'static str,
    pub critical: bool,
}

const fn d(regex: &'static str, reason: &'static str, critical: bool) -> DangerSpec {
    DangerSpec {
        regex,
        reason,
        critical,
    }
}

/// Policy-independent patterns that always force a denial.
pub(crate) const DANGEROUS: &[DangerSpec] = &[
    // Recursive and force flags in any order, combined (`-Rf`) or as
    // separate tokens (`-r -f`, `--recursive --force`).
    d(
        concat!(
            r"\brm\s+(?:-{1,2}[a-zA-Z-]+\s+)*",
            r"(?:-[a-zA-Z]*(?:[rR][a-zA-Z]*f|f[a-zA-Z]*[rR])[a-zA-Z]*",
            r"|(?:-[a-zA-Z]*[rR][a-zA-Z]*|--recursive)\s+(?:-{1,2}[a-zA-Z-]+\s+)*(?:-[a-zA-Z]*f[a-zA-Z]*|--force)",
            r"|(?:-[a-zA-Z]*f[a-zA-Z]*|--force)\s+(?:-{1,2}[a-zA-Z-]+\s+)*(?:-[a-zA-Z]*[rR][a-zA-Z]*|--recursive))",
            r"\s+(?:-{1,2}[a-zA-Z-]+\s+)*(?:/|~|\*|\$HOME)",
        ),
        "recursive forced delete of a root, home or wildcard path",
        true,
    ),
    d(r"--no-preserve-root", "delete with root protection disabled", true),
    d(
        r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
        "fork bomb",
        true,
    ),
    d(r"\bmkfs(?:\.\w+)?\s", "filesystem format", true),
    d(
        r"\bdd\s+[^\n]*\bof=/dev/(?:sd|hd|nvme|disk|mmcblk)",
        "raw write to a block device",
        true,
    ),
    d(
        r">\s*/dev/(?:sd[a-z]|hd[a-z]|nvme\d|disk\d)",
        "redirect into a block device",
        true,
    ),
    d(
        r"\bchmod\s+(?:-R\s+)?0?777\s+/",
        "world-writable permissions on an absolute path",
        false,
    ),
    d(
        r"\b(?:curl|wget)\b[^\n|]*\|\s*(?:sudo\s+)?(?:ba|z|da)?sh\b",
        "remote script piped to a shell",
        false,
    ),
    d(
        r"(?i)\bDROP\s+(?:TABLE|DATABASE|SCHEMA)\b",
        "destructive database statement",
        false,
    ),
    d(
        r"\bgit\s+push\b[^\n]*(?:--force\b|\s-f\b)[^\n]*\b(?:main|master)\b",
        "force push to a protected branch",
        false,
    ),
    d(r"\bsudo\s+rm\b", "privileged delete", false),
];
