use std::fmt;
use std::io;

/// Fatal alignment-phase errors.
///
/// Per-read outcomes (no hit, ambiguity, too many Ns) are classifications on
/// the record, never errors; only resource and input failures surface here.
#[derive(Debug)]
pub enum AlignError {
    Io(io::Error),
    /// Index files are missing, truncated, or structurally inconsistent.
    IndexFormat(String),
    InvalidInput(String),
    /// Allocation or capacity failure detected by a worker or the loader.
    Resource(String),
}

impl fmt::Display for AlignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignError::Io(e) => write!(f, "I/O error: {}", e),
            AlignError::IndexFormat(msg) => write!(f, "index format error: {}", msg),
            AlignError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            AlignError::Resource(msg) => write!(f, "resource failure: {}", msg),
        }
    }
}

impl std::error::Error for AlignError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AlignError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for AlignError {
    fn from(e: io::Error) -> Self {
        AlignError::Io(e)
    }
}

impl Clone for AlignError {
    fn clone(&self) -> Self {
        // io::Error is not Clone; the session's fatal slot hands copies to
        // every observer, so reconstruct an equivalent error.
        match self {
            AlignError::Io(e) => AlignError::Io(io::Error::new(e.kind(), e.to_string())),
            AlignError::IndexFormat(m) => AlignError::IndexFormat(m.clone()),
            AlignError::InvalidInput(m) => AlignError::InvalidInput(m.clone()),
            AlignError::Resource(m) => AlignError::Resource(m.clone()),
        }
    }
}
