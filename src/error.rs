//! Error types shared by the two transformers.
//!
//! - [`MalformedLineError`] is recoverable: the line is skipped and reported.
//! - [`ParseError`] is fatal: the run stops.
//! - [`ValidationMismatch`] is data describing the first differing line.
//!
//! [`DeltaError`] and [`ReaggregateError`] wrap them together with I/O
//! failures so that `?` works from the library up to the binaries.

use std::path::PathBuf;
use thiserror::Error;

/// A line whose field count does not match the expected `date,value` shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("odd line {line} with {fields} fields: [{text}]")]
pub struct MalformedLineError {
    /// 1-based line number in the input.
    pub line: usize,
    pub fields: usize,
    pub text: String,
}

/// A cell that could not be turned into a number (or a date).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// 1-based line number in the input.
    pub line: usize,
    pub column: Option<usize>,
    pub value: Option<String>,
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.column, &self.value) {
            (Some(col), Some(val)) => write!(
                f,
                "line {}, column {} (value '{}'): {}",
                self.line, col, val, self.message
            ),
            (Some(col), None) => write!(f, "line {}, column {}: {}", self.line, col, self.message),
            (None, Some(val)) => write!(f, "line {} (value '{}'): {}", self.line, val, self.message),
            (None, None) => write!(f, "line {}: {}", self.line, self.message),
        }
    }
}

impl std::error::Error for ParseError {}

impl ParseError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column: None,
            value: None,
            message: message.into(),
        }
    }

    pub fn with_column(mut self, column: usize) -> Self {
        self.column = Some(column);
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// First line where the generated series and the reference disagree.
/// A side that ran out of lines is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationMismatch {
    pub index: usize,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

impl std::fmt::Display for ValidationMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "producing non-matching output {}", self.index)?;
        writeln!(f, "<{}", self.actual.as_deref().unwrap_or("<missing>"))?;
        write!(f, ">{}", self.expected.as_deref().unwrap_or("<missing>"))
    }
}

/// Errors of the column delta transformer.
#[derive(Debug, Error)]
pub enum DeltaError {
    #[error("could not read or write {path:?}: {source}")]
    Io {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
}

/// Errors of the weekly reaggregator.
#[derive(Debug, Error)]
pub enum ReaggregateError {
    #[error("could not read {path:?}: {source}")]
    Io {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("invalid anchor date '{0}', expected YYYY-MM-DD")]
    InvalidAnchor(String),
}

pub type DeltaResult<T> = Result<T, DeltaError>;

pub type ReaggregateResult<T> = Result<T, ReaggregateError>;
