use std::path::PathBuf;

/// Errors surfaced by the warden crates.
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    /// A configuration file or value could not be used.
    #[error("invalid config: {0}")]
    Config(String),

    /// The task queue could not be read at all.
    #[error("invalid task queue: {0}")]
    Queue(String),

    /// The agent process could not be started.
    #[error("failed to spawn agent `{bin}`: {source}")]
    Spawn {
        bin: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_error_names_binary() {
        let err = WardenError::Spawn {
            bin: PathBuf::from("claude"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        let msg = err.to_string();
        assert!(msg.contains("`claude`"), "{msg}");
        assert!(msg.contains("no such file"), "{msg}");
    }

    #[test]
    fn io_error_is_transparent() {
        let err: WardenError = std::io::Error::other("disk full").into();
        assert_eq!(err.to_string(), "disk full");
    }
}
