//! Error types for the /proc query library

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for this library
pub type Result<T> = std::result::Result<T, ProcError>;

/// Error types that can occur when querying /proc
#[derive(Error, Debug)]
pub enum ProcError {
    /// A pseudo-file or directory could not be opened or read
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Content did not match the expected fixed shape
    #[error("Unexpected format: {0}")]
    Format(String),

    /// No listening socket on the requested port
    #[error("No process found listening on port {port}")]
    NoProcessListening { port: u16 },

    /// No process holds the socket with this token
    #[error("No process with socket:[{token}] found")]
    NoProcessWithSocket { token: String },

    /// Feature not supported on this platform
    #[error("Not supported on this platform: {0}")]
    NotSupported(String),
}

impl ProcError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProcError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        ProcError::Format(msg.into())
    }

    /// True for semantic absence: no listener on the port, or no owner for the socket
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ProcError::NoProcessListening { .. } | ProcError::NoProcessWithSocket { .. }
        )
    }

    /// True when the underlying file did not exist (e.g. the process exited)
    pub fn is_missing_file(&self) -> bool {
        matches!(
            self,
            ProcError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}
