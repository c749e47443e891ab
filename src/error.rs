use thiserror::Error;

#[derive(Error, Debug)]
pub enum LotkitError {
    #[error("Invalid batch '{batch_id}': {reason}")]
    InvalidInput { batch_id: String, reason: String },

    #[error("Intensity undefined: total quantity is zero")]
    DivisionUndefined,

    #[error("Unknown group key: {0}")]
    UnknownGroupKey(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Null value in column '{column}' at row {row}")]
    NullValue { column: String, row: usize },

    #[error("Invalid factor for '{category}': {value}")]
    InvalidFactor { category: String, value: String },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Data not loaded: {0}")]
    NotLoaded(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl LotkitError {
    pub(crate) fn invalid(batch_id: &str, reason: impl Into<String>) -> Self {
        LotkitError::InvalidInput {
            batch_id: batch_id.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(feature = "python")]
impl From<LotkitError> for pyo3::PyErr {
    fn from(err: LotkitError) -> pyo3::PyErr {
        use pyo3::exceptions::{PyRuntimeError, PyValueError, PyZeroDivisionError};

        match err {
            LotkitError::InvalidInput { .. }
            | LotkitError::InvalidFactor { .. }
            | LotkitError::InvalidConfig(_)
            | LotkitError::UnknownGroupKey(_) => PyValueError::new_err(err.to_string()),
            LotkitError::DivisionUndefined => PyZeroDivisionError::new_err(err.to_string()),
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }
}
