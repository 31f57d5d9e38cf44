//! Named risk factors. Each is a pure function of the action and the session
//! history returning a signed contribution; `None` means "does not apply".

use std::path::Path;

use warden_core::action::command_name;
use warden_core::{ActionType, HistoryStats};

pub struct FactorInput<'a> {
    pub action_type: ActionType,
    pub target: &'a str,
    pub raw_text: &'a str,
    pub history: &'a HistoryStats,
}

impl FactorInput<'_> {
    fn tokens(&self) -> std::str::SplitWhitespace<'_> {
        self.raw_text.split_whitespace()
    }

    fn has_token(&self, candidates: &[&str]) -> bool {
        self.tokens().any(|t| candidates.contains(&t))
    }
}

pub(crate) type FactorFn = fn(&FactorInput<'_>) -> Option<f64>;

pub(crate) struct Factor {
    pub name: &'static str,
    pub eval: FactorFn,
}

const fn f(name: &'static str, eval: FactorFn) -> Factor {
    Factor { name, eval }
}

fn when(cond: bool, value: f64) -> Option<f64> {
    cond.then_some(value)
}

// ── File targets ──

pub(crate) const FILE_CREATE: &[Factor] = &[
    f("sensitive_file", sensitive_file),
    f("system_path", system_path),
    f("config_file", config_file),
    f("test_or_docs", test_or_docs),
];

pub(crate) const FILE_EDIT: &[Factor] = &[
    f("sensitive_file", sensitive_file),
    f("system_path", system_path),
    f("config_file", config_file),
    f("test_or_docs", test_or_docs),
    f("repeated_edits", repeated_edits),
];

pub(crate) const FILE_DELETE: &[Factor] = &[
    f("sensitive_file", sensitive_file),
    f("system_path", system_path),
    f("config_file", config_file),
    f("test_or_docs", test_or_docs),
    f("wildcard", wildcard),
    f("session_created", session_created),
];

const SENSITIVE_NAMES: &[&str] = &[
    "id_rsa",
    "id_dsa",
    "id_ecdsa",
    "id_ed25519",
    "credentials",
    "credentials.json",
    "secrets.json",
    "secrets.yaml",
    "secrets.yml",
    ".npmrc",
    ".pypirc",
    ".netrc",
    ".htpasswd",
];
const SENSITIVE_EXTENSIONS: &[&str] = &["pem", "key", "p12", "pfx", "keystore", "jks"];
const SENSITIVE_DIRS: &[&str] = &[".ssh/", ".aws/", ".gnupg/", ".kube/"];

fn file_name(target: &str) -> &str {
    Path::new(target)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(target)
}

fn sensitive_file(input: &FactorInput<'_>) -> Option<f64> {
    let name = file_name(input.target).to_ascii_lowercase();
    let ext = Path::new(&name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    let is_env = name == ".env" || name.starts_with(".env.");
    let sensitive = is_env
        || SENSITIVE_NAMES.contains(&name.as_str())
        || SENSITIVE_EXTENSIONS.contains(&ext)
        || SENSITIVE_DIRS.iter().any(|d| input.target.contains(d));
    when(sensitive, 0.35)
}

const SYSTEM_PREFIXES: &[&str] = &[
    "/etc/", "/usr/", "/bin/", "/sbin/", "/boot/", "/lib/", "/var/lib/", "/System/",
];

/// Whole-tree targets: the filesystem root and the home directory.
const SYSTEM_ROOTS: &[&str] = &["/", "/*", "~", "~/", "~/*", "$HOME", "$HOME/"];

fn system_path(input: &FactorInput<'_>) -> Option<f64> {
    let t = input.target;
    let windows = t.to_ascii_lowercase().starts_with("c:\\windows");
    when(
        windows || SYSTEM_ROOTS.contains(&t) || SYSTEM_PREFIXES.iter().any(|p| t.starts_with(p)),
        0.3,
    )
}

const CONFIG_NAMES: &[&str] = &[
    "package.json",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.toml",
    "Cargo.lock",
    "pyproject.toml",
    "go.mod",
    "tsconfig.json",
    "Dockerfile",
    "docker-compose.yml",
    "Makefile",
];

fn config_file(input: &FactorInput<'_>) -> Option<f64> {
    let name = file_name(input.target);
    when(
        CONFIG_NAMES.contains(&name) || input.target.contains(".github/workflows/"),
        0.1,
    )
}

fn test_or_docs(input: &FactorInput<'_>) -> Option<f64> {
    let t = input.target;
    let name = file_name(t);
    let in_tests = t.starts_with("tests/")
        || t.contains("/tests/")
        || t.contains("/test/")
        || t.contains("__tests__")
        || name.contains("_test.")
        || name.contains(".test.")
        || name.contains(".spec.");
    let docs = t.starts_with("docs/")
        || t.contains("/docs/")
        || matches!(
            Path::new(name).extension().and_then(|e| e.to_str()),
            Some("md" | "rst" | "txt")
        );
    when(in_tests || docs, -0.1)
}

fn repeated_edits(input: &FactorInput<'_>) -> Option<f64> {
    let edits = input.history.for_action(input.action_type, input.target).edits;
    when(edits >= 5, 0.1)
}

fn wildcard(input: &FactorInput<'_>) -> Option<f64> {
    when(input.target.contains(['*', '?']), 0.3)
}

fn session_created(input: &FactorInput<'_>) -> Option<f64> {
    let creates = input
        .history
        .for_action(input.action_type, input.target)
        .creates;
    when(creates > 0, -0.2)
}

// ── Package installs ──

pub(crate) const INSTALL: &[Factor] = &[
    f("dev_only", dev_only),
    f("global_install", global_install),
    f("remote_source", remote_source),
    f("many_packages", many_packages),
];

fn dev_only(input: &FactorInput<'_>) -> Option<f64> {
    when(input.has_token(&["-D", "--save-dev", "--dev", "--group=dev"]), -0.1)
}

fn global_install(input: &FactorInput<'_>) -> Option<f64> {
    when(input.has_token(&["-g", "--global", "sudo"]), 0.3)
}

fn remote_source(input: &FactorInput<'_>) -> Option<f64> {
    let remote = ["git+", "http://", "https://", "github:", "git@"]
        .iter()
        .any(|p| input.target.contains(p));
    when(remote, 0.3)
}

fn many_packages(input: &FactorInput<'_>) -> Option<f64> {
    let count = input
        .target
        .split_whitespace()
        .filter(|t| !t.starts_with('-'))
        .count();
    when(count > 5, 0.1)
}

// ── Commands ──

pub(crate) const COMMAND: &[Factor] = &[
    f("elevated", elevated),
    f("pipe_to_shell", pipe_to_shell),
    f("network_tool", network_tool),
    f("read_only", read_only),
    f("familiar_command", familiar_command),
];

fn elevated(input: &FactorInput<'_>) -> Option<f64> {
    let first = input.target.split_whitespace().next().unwrap_or("");
    when(
        matches!(first, "sudo" | "su" | "doas") || input.has_token(&["sudo"]),
        0.4,
    )
}

fn pipe_to_shell(input: &FactorInput<'_>) -> Option<f64> {
    let piped = input.raw_text.split('|').skip(1).any(|segment| {
        let cmd = command_name(segment);
        matches!(cmd, "sh" | "bash" | "zsh" | "dash")
    });
    when(piped, 0.4)
}

fn network_tool(input: &FactorInput<'_>) -> Option<f64> {
    when(
        matches!(
            command_name(input.target),
            "curl" | "wget" | "ssh" | "scp" | "rsync" | "nc"
        ),
        0.1,
    )
}

const READ_ONLY: &[&str] = &[
    "ls", "cat", "head", "tail", "grep", "rg", "find", "pwd", "echo", "wc", "which", "tree",
    "stat", "du", "df",
];

fn read_only(input: &FactorInput<'_>) -> Option<f64> {
    let t = input.target.trim_start();
    let git_read = ["git status", "git diff", "git log", "git show"]
        .iter()
        .any(|p| t.starts_with(p));
    when(
        git_read || READ_ONLY.contains(&command_name(t)),
        -0.2,
    )
}

fn familiar_command(input: &FactorInput<'_>) -> Option<f64> {
    let seen = input
        .history
        .for_action(input.action_type, input.target)
        .invocations;
    when(seen >= 5, -0.05)
}

// ── Git ──

pub(crate) const GIT_COMMIT: &[Factor] = &[f("skip_hooks", skip_hooks), f("amend", amend)];

fn skip_hooks(input: &FactorInput<'_>) -> Option<f64> {
    when(input.has_token(&["--no-verify", "-n"]), 0.2)
}

fn amend(input: &FactorInput<'_>) -> Option<f64> {
    when(input.has_token(&["--amend"]), 0.1)
}

pub(crate) const GIT_PUSH: &[Factor] = &[
    f("force_push", force_push),
    f("protected_branch", protected_branch),
];

fn force_push(input: &FactorInput<'_>) -> Option<f64> {
    let forced = input
        .tokens()
        .any(|t| t == "-f" || t.starts_with("--force") || t.starts_with('+'));
    when(forced, 0.3)
}

fn protected_branch(input: &FactorInput<'_>) -> Option<f64> {
    let protected = input.tokens().any(|t| {
        let branch = t.rsplit(':').next().unwrap_or(t);
        matches!(branch, "main" | "master")
    });
    when(protected, 0.15)
}

// ── Network ──

pub(crate) const NETWORK: &[Factor] = &[
    f("insecure_http", insecure_http),
    f("upload", upload),
    f("pipe_to_shell", pipe_to_shell),
    f("localhost", localhost),
];

fn is_local(url: &str) -> bool {
    ["://localhost", "://127.0.0.1", "://0.0.0.0", "://[::1]"]
        .iter()
        .any(|h| url.contains(h))
}

fn insecure_http(input: &FactorInput<'_>) -> Option<f64> {
    when(
        input.target.starts_with("http://") && !is_local(input.target),
        0.1,
    )
}

fn upload(input: &FactorInput<'_>) -> Option<f64> {
    let flagged = input.has_token(&[
        "-d",
        "--data",
        "--data-raw",
        "--data-binary",
        "-F",
        "--form",
        "-T",
        "--upload-file",
        "POST",
        "PUT",
    ]);
    when(flagged, 0.2)
}

fn localhost(input: &FactorInput<'_>) -> Option<f64> {
    when(is_local(input.target), -0.2)
}
