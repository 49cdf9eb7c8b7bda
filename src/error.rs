//! Library error type shared by scoring, feedback ingestion and retraining.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CredibilityError>;

#[derive(Debug, Error)]
pub enum CredibilityError {
    /// Malformed scoring request (empty/ill-formed url, alpha out of range).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A feedback row that could not be turned into a labelled example.
    #[error("data format error at line {line}: {reason}")]
    DataFormat { line: usize, reason: String },

    /// Not enough usable, distinctly labelled records to fit a model.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Artifact unreadable or incompatible with the extracted features.
    #[error("model load error: {0}")]
    ModelLoad(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CredibilityError {
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        CredibilityError::InvalidInput(msg.into())
    }

    pub fn data_format<S: Into<String>>(line: usize, reason: S) -> Self {
        CredibilityError::DataFormat {
            line,
            reason: reason.into(),
        }
    }

    pub fn insufficient_data<S: Into<String>>(msg: S) -> Self {
        CredibilityError::InsufficientData(msg.into())
    }

    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        CredibilityError::ModelLoad(msg.into())
    }

    /// Stable short name, used as a metrics label and in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            CredibilityError::InvalidInput(_) => "invalid_input",
            CredibilityError::DataFormat { .. } => "data_format",
            CredibilityError::InsufficientData(_) => "insufficient_data",
            CredibilityError::ModelLoad(_) => "model_load",
            CredibilityError::Io(_) => "io",
            CredibilityError::Serialization(_) => "serialization",
        }
    }
}
