//! Error types for the financial query agent

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {

    // =============================
    // Core Pipeline Errors
    // =============================

    /// Price series shorter than the configured lookbacks allow.
    /// Surfaced instead of a zero-filled snapshot so callers can tell
    /// "no signal" apart from a real zero reading.
    #[error("Insufficient data: {required} observations required, {available} available")]
    InsufficientData { required: usize, available: usize },

    #[error("Invalid price series: {0}")]
    InvalidSeries(String),

    #[error("Query parse error: {0}")]
    ParseError(String),

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
