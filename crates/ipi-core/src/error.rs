//! Error types for the ipi-core library.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the ipi library.
#[derive(Error, Debug)]
pub enum IpiError {
    /// The input path given for the documents is not a directory.
    #[error("input path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors related to loading the TIPI reference table.
#[derive(Error, Debug)]
pub enum TableError {
    /// The table file could not be opened.
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line could not be read from the table source.
    #[error("failed to read table: {0}")]
    Read(#[from] csv::Error),

    /// The rate column of a line is not a non-negative decimal.
    #[error("invalid rate {value:?} on line {line}")]
    InvalidRate { line: u64, value: String },

    /// The code column of a line is not valid UTF-8.
    #[error("invalid NCM code {value:?} on line {line}")]
    InvalidCode { line: u64, value: String },
}

/// Errors related to reading a single input document.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// The document could not be opened.
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not well-formed XML.
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    /// The document ended with open elements.
    #[error("unexpected end of document, {0} element(s) left open")]
    Truncated(usize),

    /// The document has no root element.
    #[error("document has no root element")]
    NoRoot,

    /// Elements or text outside the single root element.
    #[error("content outside the root element")]
    OutsideRoot,
}

/// Errors related to a single line item. These never abort a document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ItemError {
    /// A required field is absent or blank.
    #[error("missing required field {0}")]
    MissingField(&'static str),

    /// A field is present but its value cannot be used.
    #[error("invalid value {value:?} for {field}")]
    InvalidValue { field: &'static str, value: String },

    /// The classification code has no entry in the TIPI table.
    #[error("item skipped, NCM {code} has no IPI rate")]
    NoRate { code: String },

    /// The tax, or the running subtotal, does not fit in a `Decimal`.
    #[error("item skipped, IPI for NCM {code} overflows")]
    Overflow { code: String },
}

/// Errors related to the activity log.
#[derive(Error, Debug)]
pub enum LogError {
    /// The log root exists but is not a directory.
    #[error("log root is not a directory: {}", .0.display())]
    InvalidRoot(PathBuf),

    /// Creating directories or writing the log file failed.
    #[error("failed to write log at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for the ipi library.
pub type Result<T> = std::result::Result<T, IpiError>;
