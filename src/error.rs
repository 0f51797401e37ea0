use std::io;
use thiserror::Error;

/// Result type for EDF operations
pub type Result<T> = std::result::Result<T, EdfError>;

/// Unified error type for all EDF operations
#[derive(Debug, Error)]
pub enum EdfError {
    // Single-field shape/value violations
    #[error("schema violation: {0}")]
    Schema(String),

    // Missing/extra/misdeclared archive files
    #[error("invalid archive structure: {0}")]
    Structure(String),

    // Cross-file identifier/count/content mismatches
    #[error("consistency error: {0}")]
    Consistency(String),

    // Aggregate of every problem found in one validation pass
    #[error("validation failed with {} error(s)", errors.len())]
    Validation {
        errors: Vec<String>,
        warnings: Vec<String>,
    },

    // Facade-level misuse: bad ID, duplicate ID, out-of-range grade,
    // malformed distribution, mixed content kinds, empty save
    #[error("invalid input: {0}")]
    UserInput(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Container errors
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl EdfError {
    /// Every message carried by this error, one line per problem.
    ///
    /// For `Validation` this is the full aggregate; for everything else it is
    /// the single rendered message.
    pub fn messages(&self) -> Vec<String> {
        match self {
            EdfError::Validation { errors, .. } => errors.clone(),
            other => vec![other.to_string()],
        }
    }
}
