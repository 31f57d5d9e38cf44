use serde::{Deserialize, Serialize};

/// Kind of action observed in agent output.
///
/// Declaration order is the classifier's tie-break order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    DangerousCommand,
    FileDelete,
    FileEdit,
    FileCreate,
    GitPush,
    GitCommit,
    NpmInstall,
    PackageInstall,
    NetworkRequest,
    CommandRun,
}

impl ActionType {
    pub const ALL: [ActionType; 10] = [
        ActionType::DangerousCommand,
        ActionType::FileDelete,
        ActionType::FileEdit,
        ActionType::FileCreate,
        ActionType::GitPush,
        ActionType::GitCommit,
        ActionType::NpmInstall,
        ActionType::PackageInstall,
        ActionType::NetworkRequest,
        ActionType::CommandRun,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::DangerousCommand => "dangerous_command",
            ActionType::FileDelete => "file_delete",
            ActionType::FileEdit => "file_edit",
            ActionType::FileCreate => "file_create",
            ActionType::GitPush => "git_push",
            ActionType::GitCommit => "git_commit",
            ActionType::NpmInstall => "npm_install",
            ActionType::PackageInstall => "package_install",
            ActionType::NetworkRequest => "network_request",
            ActionType::CommandRun => "command_run",
        }
    }

    /// Targets are file paths; history tracks creates/edits/deletes.
    pub fn is_file_like(self) -> bool {
        matches!(
            self,
            ActionType::FileCreate | ActionType::FileEdit | ActionType::FileDelete
        )
    }

    /// Targets are command lines; history tracks invocations of the command name.
    pub fn is_command_like(self) -> bool {
        !self.is_file_like()
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown action type: \"{s}\""))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Critical,
}

/// Why a dangerous pattern fired.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Danger {
    pub reason: String,
    pub severity: Severity,
}

/// A classified action. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEvent {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub target: String,
    pub raw_text: String,
    /// In `(0, 1]`.
    pub confidence: f64,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub danger: Option<Danger>,
}

impl ActionEvent {
    pub fn is_dangerous(&self) -> bool {
        self.action_type == ActionType::DangerousCommand
    }

    /// First whitespace-separated token of the target, used as the command key.
    pub fn command_name(&self) -> &str {
        command_name(&self.target)
    }
}

/// First token of a command line, with any leading `sudo` skipped.
pub fn command_name(command: &str) -> &str {
    let mut tokens = command.split_whitespace();
    match tokens.next() {
        Some("sudo") => tokens.next().unwrap_or("sudo"),
        Some(first) => first,
        None => "",
    }
}
