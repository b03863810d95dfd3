//! Error taxonomy of the library layer.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{op} requires at least one value")]
    EmptyInput { op: &'static str },

    #[error("column {column:?} has no non-missing values")]
    EmptyColumn { column: String },

    #[error("policy {policy} cannot be applied to column {column:?}: {reason}")]
    InvalidPolicy {
        column: String,
        policy: String,
        reason: String,
    },

    #[error("{op} requires at least {required} values, but got {len}")]
    InsufficientLength {
        op: &'static str,
        len: usize,
        required: usize,
    },

    #[error("source {path:?} not found")]
    SourceNotFound { path: PathBuf },

    #[error("failed to parse {path:?} at line {line}: {msg}")]
    ParseError {
        path: PathBuf,
        line: u64,
        msg: String,
    },

    #[error("column {0:?} not found")]
    ColumnNotFound(String),

    #[error("duplicate column name {0:?}")]
    DuplicateColumn(String),

    #[error("length mismatch: expected {expected}, found {found}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("column {column:?} is {found}, but {expected} is required")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("column {column:?} has {count} missing values")]
    MissingValues { column: String, count: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{op}: normal equations are singular")]
    SingularSystem { op: &'static str },

    #[error("I/O error on {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
