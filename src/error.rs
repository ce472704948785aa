//! Error handling for SMAP parsing, composition and lookup.

use std::fmt;

use crate::models::RangeMapping;

/// Main error type for SMAP operations
#[derive(Debug)]
pub enum SmapError {
    /// I/O operation failed
    Io(std::io::Error),
    /// JSON serialization/deserialization failed
    Json(serde_json::Error),
    /// The textual encoding is malformed
    Parse {
        /// 1-based line of the encoded text
        line: usize,
        message: String,
    },
    /// A generated line falls in no interval of the class SMAP
    UnmappedLine { line: u32, context: String },
    /// Two intervals share a destination line
    Overlap {
        first: RangeMapping,
        second: RangeMapping,
    },
    /// A mapping references a file id that is not declared
    UnknownFile(u32),
    /// Configuration error
    Config(String),
    /// Any other internal consistency violation
    Internal(String),
}

impl SmapError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        SmapError::Parse {
            line,
            message: message.into(),
        }
    }

    /// True for errors that indicate a defect in the producer of the mapping
    /// rather than bad input.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            SmapError::UnmappedLine { .. } | SmapError::Overlap { .. } | SmapError::Internal(_)
        )
    }
}

impl fmt::Display for SmapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmapError::Io(err) => write!(f, "I/O error: {err}"),
            SmapError::Json(err) => write!(f, "JSON error: {err}"),
            SmapError::Parse { line, message } => write!(f, "Parse error at line {line}: {message}"),
            SmapError::UnmappedLine { line, context } => {
                write!(f, "Unmapped line {line}: {context}")
            }
            SmapError::Overlap { first, second } => write!(
                f,
                "Overlapping destination ranges: {first} and {second}"
            ),
            SmapError::UnknownFile(id) => write!(f, "Unknown file id: {id}"),
            SmapError::Config(msg) => write!(f, "Configuration error: {msg}"),
            SmapError::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for SmapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SmapError::Io(err) => Some(err),
            SmapError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SmapError {
    fn from(err: std::io::Error) -> Self {
        SmapError::Io(err)
    }
}

impl From<serde_json::Error> for SmapError {
    fn from(err: serde_json::Error) -> Self {
        SmapError::Json(err)
    }
}

/// Result type for SMAP operations
pub type Result<T> = std::result::Result<T, SmapError>;

/// Extension trait for adding context to results
pub trait ErrorContext<T> {
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    fn context(self, msg: &str) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| SmapError::Internal(format!("{}: {e}", f())))
    }

    fn context(self, msg: &str) -> Result<T> {
        self.with_context(|| msg.to_string())
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.ok_or_else(|| SmapError::Internal(f()))
    }

    fn context(self, msg: &str) -> Result<T> {
        self.with_context(|| msg.to_string())
    }
}
