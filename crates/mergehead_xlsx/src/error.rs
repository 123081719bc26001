//! Top-level error type.

use thiserror::Error;

/// Export failure. Every variant aborts the current export.
#[derive(Error, Debug)]
pub enum MergeHeadError {
    /// Header spec, object template, options or sheet bounds are inconsistent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A record does not expose a requested field.
    #[error("field {field:?} is not readable on record #{record_index}")]
    FieldAccess {
        /// Requested field name.
        field: String,
        /// Zero-based record position in the dataset.
        record_index: usize,
    },

    /// DataFrame decoding or column access failed.
    #[error("dataframe error: {0}")]
    DataFrame(String),

    /// Workbook construction or serialization failed.
    #[error("xlsx write error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    /// Output sink failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, MergeHeadError>;
