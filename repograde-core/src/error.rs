//! Error types for RepoGrade core.

use std::{error::Error, fmt, io};

/// Error type for RepoGrade core operations.
#[derive(Debug)]
pub enum RepoGradeError {
    /// An underlying I/O error.
    Io(io::Error),
    /// Structured data could not be parsed.
    Parse(String),
    /// A classification pattern failed to compile.
    Pattern(String),
    /// A catch-all error with a message.
    Other(String),
}

impl fmt::Display for RepoGradeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::Parse(message) => write!(f, "parse error: {message}"),
            Self::Pattern(message) => write!(f, "invalid pattern: {message}"),
            Self::Other(message) => write!(f, "{message}"),
        }
    }
}

impl Error for RepoGradeError {}

impl From<io::Error> for RepoGradeError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for RepoGradeError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value.to_string())
    }
}

impl From<regex::Error> for RepoGradeError {
    fn from(value: regex::Error) -> Self {
        Self::Pattern(value.to_string())
    }
}

/// Convenience result type for RepoGrade core.
pub type Result<T> = std::result::Result<T, RepoGradeError>;
