use thiserror::Error;

/// Canonical result for every tabula crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The column is absent, or it exists with a different element type.
    #[error("column not found: {0}")]
    ColumnNotFound(String),

    /// Input shape contradicts the table's current shape.
    #[error("inconsistent data: {0}")]
    InconsistentData(String),

    /// The requested policy cannot be applied to this element type.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// A pooled task panicked or was dropped before producing its result.
    #[error("task failed: {0}")]
    Task(String),
}

impl Error {
    pub fn column_not_found(name: &str) -> Self {
        Error::ColumnNotFound(name.to_string())
    }

    pub fn type_mismatch(name: &str, stored: &str, requested: &str) -> Self {
        Error::ColumnNotFound(format!(
            "'{name}' holds {stored}, requested {requested}"
        ))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}
