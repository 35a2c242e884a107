//! Analysis errors.
//!
//! None of these reach the caller's control flow directly: the driver
//! records the last one and answers "no result" for the request.

use std::fmt;

use rowan::{TextRange, TextSize};
use replty_sig::SigError;

/// An error that aborted one analysis request.
#[derive(Debug)]
pub enum AnalysisError {
    /// Evaluation nested deeper than the configured limit.
    DepthLimit { limit: usize, span: TextRange },
    /// The cursor lies past the end of the analyzed source.
    OffsetOutOfRange { offset: TextSize, len: TextSize },
    /// Loading signatures on demand failed.
    Signature(SigError),
}

impl AnalysisError {
    /// Source location the error points at, if any.
    pub fn span(&self) -> Option<TextRange> {
        match self {
            AnalysisError::DepthLimit { span, .. } => Some(*span),
            AnalysisError::OffsetOutOfRange { len, .. } => Some(TextRange::empty(*len)),
            AnalysisError::Signature(_) => None,
        }
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::DepthLimit { limit, .. } => {
                write!(f, "expression nesting exceeds the evaluation depth limit of {}", limit)
            }
            AnalysisError::OffsetOutOfRange { offset, len } => {
                write!(
                    f,
                    "offset {} is out of range for source of length {}",
                    u32::from(*offset),
                    u32::from(*len)
                )
            }
            AnalysisError::Signature(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for AnalysisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AnalysisError::Signature(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SigError> for AnalysisError {
    fn from(err: SigError) -> Self {
        AnalysisError::Signature(err)
    }
}
