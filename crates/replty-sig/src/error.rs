//! Signature loading errors.

use std::fmt;
use std::path::PathBuf;

/// An error raised while loading signature documents.
#[derive(Debug)]
pub enum SigError {
    /// A signature file could not be read.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A signature document is not valid.
    Parse {
        /// `None` for documents parsed from memory.
        path: Option<PathBuf>,
        message: String,
    },
}

impl fmt::Display for SigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigError::Io { path, source } => {
                write!(f, "cannot read signature file {}: {}", path.display(), source)
            }
            SigError::Parse {
                path: Some(path),
                message,
            } => write!(f, "invalid signature file {}: {}", path.display(), message),
            SigError::Parse {
                path: None,
                message,
            } => write!(f, "invalid signature document: {}", message),
        }
    }
}

impl std::error::Error for SigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SigError::Io { source, .. } => Some(source),
            SigError::Parse { .. } => None,
        }
    }
}
