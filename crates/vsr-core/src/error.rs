use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VsrError>;

#[derive(Debug, Error)]
pub enum VsrError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid tree entry '{}': {reason}", path.display())]
    InvalidTreeEntry { path: PathBuf, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("server has not fully booted yet")]
    NotBooted,

    #[error("no players online, backup skipped")]
    NoPlayersOnline,

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("operation interrupted")]
    Interrupted,

    #[error("server is not running")]
    ServerNotRunning,

    #[error("server exited unexpectedly")]
    ServerExited,

    #[error("external tool failed: {0}")]
    Tool(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<VsrError>,
    },

    #[error("{0}")]
    Other(String),
}

impl VsrError {
    /// Gate conditions that mean "try again next tick", not a failure.
    pub fn is_skip(&self) -> bool {
        match self {
            VsrError::NotBooted | VsrError::NoPlayersOnline => true,
            VsrError::Context { source, .. } => source.is_skip(),
            _ => false,
        }
    }

    /// Prefix a configuration message; other variants pass through unchanged.
    pub fn config_context(self, what: &str) -> VsrError {
        match self {
            VsrError::Config(msg) => VsrError::Config(format!("{what}: {msg}")),
            other => other,
        }
    }

    /// The innermost error, skipping any context wrappers.
    pub fn root(&self) -> &VsrError {
        match self {
            VsrError::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Attach a human-readable step description to an error.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<VsrError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| VsrError::Context {
            context: context.into(),
            source: Box::new(e.into()),
        })
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| VsrError::Context {
            context: f().into(),
            source: Box::new(e.into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_skips_survive_context_wrapping() {
        let err: Result<()> = Err(VsrError::NoPlayersOnline);
        let wrapped = err.context("player gate").unwrap_err();
        assert!(wrapped.is_skip());
        assert!(matches!(wrapped.root(), VsrError::NoPlayersOnline));
    }

    #[test]
    fn io_failures_are_not_skips() {
        let err: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let wrapped = err.context("read save").unwrap_err();
        assert!(!wrapped.is_skip());
        assert_eq!(wrapped.to_string(), "read save: I/O error: gone");
    }
}
