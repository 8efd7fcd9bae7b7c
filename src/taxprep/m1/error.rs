use std::path::PathBuf;

use thiserror::Error;

use crate::taxprep::m1::provider::ProviderError;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, AssistantError>;

/// Error type covering the different failure cases that can occur when the
/// assistant loads trial balances, talks to the model, or emits the working
/// paper.
#[derive(Debug, Error)]
pub enum AssistantError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Raised when a CSV trial balance cannot be parsed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when an input file has an extension no loader understands.
    #[error("unsupported file type for {0} (expected .csv or .xlsx)")]
    UnsupportedFormat(PathBuf),

    /// Raised when an input file parses but holds no data rows.
    #[error("no data rows found in {0}")]
    EmptyDataset(PathBuf),

    /// Raised when a workbook lacks the sheet a reader expects.
    #[error("invalid workbook structure: {0}")]
    InvalidSheet(String),

    /// Raised when a tool payload does not match its declared schema.
    #[error("invalid arguments for tool '{tool}': {reason}")]
    InvalidToolArguments { tool: String, reason: String },

    /// Raised when the model credential is absent from the environment.
    #[error("missing required environment variable {0}")]
    MissingCredential(String),

    /// Raised when a configuration value or the `.env` file cannot be parsed.
    #[error("invalid value '{value}' for {key}")]
    InvalidConfig { key: String, value: String },

    /// Failures reported by the model client.
    #[error("model provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Raised when the agent keeps calling tools past the configured limit.
    #[error("agent did not finish within {0} turns")]
    TurnLimitExceeded(usize),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

impl AssistantError {
    /// Shorthand for building an [`AssistantError::InvalidToolArguments`].
    pub fn invalid_arguments(tool: &str, reason: impl Into<String>) -> Self {
        Self::InvalidToolArguments {
            tool: tool.to_string(),
            reason: reason.into(),
        }
    }
}
