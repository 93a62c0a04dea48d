use crate::assertions::AssertionFailure;
use crate::node::NodeError;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, ConformanceError>;

#[derive(Debug, thiserror::Error)]
pub enum ConformanceError {
    /// Scenario data contradicts itself. A harness bug, never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Assertion failed: {0}")]
    Assertion(#[from] AssertionFailure),

    #[error("Process `{command}` still running {timeout:?} after SIGKILL")]
    Shutdown { command: String, timeout: Duration },

    #[error("Endpoint error: {0}")]
    Node(#[from] NodeError),

    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML in {path}: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

impl ConformanceError {
    /// Whether a fresh attempt of the same scenario may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Launch { .. } | Self::Assertion(_) | Self::Node(_)
        )
    }
}
