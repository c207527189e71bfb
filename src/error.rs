//! Error types for kernel counter reads.
//!
//! Readers use these internally; the public sampling API never surfaces them.
//! Failures are logged and mapped to zeroed results plus availability flags.

use std::path::{Path, PathBuf};

/// Failure to read or parse a kernel-exposed file.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed data in {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("{what} not found in {path}")]
    Missing { path: PathBuf, what: &'static str },
}

impl ReadError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        ReadError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn malformed(path: &Path, reason: impl Into<String>) -> Self {
        ReadError::Malformed {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn missing(path: &Path, what: &'static str) -> Self {
        ReadError::Missing {
            path: path.to_path_buf(),
            what,
        }
    }

    /// True when the underlying file is gone (process exited, sensor unplugged).
    ///
    /// A process that exits after its stat file was opened fails the read
    /// with ESRCH rather than ENOENT; both count.
    pub fn is_not_found(&self) -> bool {
        match self {
            ReadError::Io { source, .. } => {
                source.kind() == std::io::ErrorKind::NotFound
                    || source.raw_os_error() == Some(libc::ESRCH)
            }
            _ => false,
        }
    }
}

/// Reads a whole kernel text file, tagging failures with the path.
pub fn read_to_string(path: &Path) -> Result<String, ReadError> {
    std::fs::read_to_string(path).map_err(|e| ReadError::io(path, e))
}
