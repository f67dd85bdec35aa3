//! Error types and handling
//!
//! Domain errors for the buildpack lifecycle orchestrator, grouped by the
//! categories a caller needs to distinguish: usage mistakes, preconditions
//! that were checked and failed, transient fetch failures, lifecycle phase
//! failures, codec/validation failures, and user cancellation.

use thiserror::Error;

/// Domain errors for pack-core.
#[derive(Error, Debug)]
pub enum PackError {
    /// Bad flags or missing required configuration. Maps to exit code 2.
    #[error("{message}")]
    Usage { message: String },

    /// A precondition was checked and failed: stack mismatch, missing image
    /// under `--no-pull`, missing label on a package image, etc.
    #[error("{message}")]
    Precondition { message: String },

    /// Registry/daemon fetch failed after retries, or auth failed outright.
    #[error("{message}")]
    Fetch { message: String },

    /// A lifecycle phase container exited non-zero.
    #[error("failed with status code: {exit_code} executing phase '{phase}'")]
    PhaseFailure { phase: String, exit_code: i64 },

    /// Malformed `buildpack.toml`, duplicate layer path, missing label, etc.
    #[error("{message}")]
    Codec { message: String },

    /// The user sent SIGINT/SIGTERM.
    #[error("cancelled")]
    Cancelled,

    /// Docker CLI invocation failed.
    #[error("docker: {message}")]
    Docker { message: String },

    /// Configuration file error ($PACK_HOME/config.toml, builder.toml, package.toml).
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Wraps an I/O error with the operation that triggered it.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl PackError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch {
            message: message.into(),
        }
    }

    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    pub fn docker(message: impl Into<String>) -> Self {
        Self::Docker {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// The process exit code this error maps to, per the CLI's error-handling
    /// contract: usage errors are 2, cancellation is 130 on POSIX (1 on
    /// Windows), everything else is 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            PackError::Usage { .. } => 2,
            PackError::Cancelled => {
                if cfg!(windows) {
                    1
                } else {
                    130
                }
            }
            _ => 1,
        }
    }
}

/// Convenience type alias for Results with PackError.
pub type Result<T> = std::result::Result<T, PackError>;
