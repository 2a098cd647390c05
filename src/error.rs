// Typed failure taxonomy for the ingestion pipeline.
// Extraction/validation errors abort the call; verification Review is
// recorded but non-fatal and never surfaces here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Unreadable or undecodable input. Fatal, no retry inside the core.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Structured passthrough payload did not match the statement schema.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Verification report came back Fail with at least one ERROR issue.
    #[error("verification failed ({codes:?}): {message}")]
    Verification { codes: Vec<String>, message: String },

    /// Currency lookup refused to default. The reference converter never
    /// raises this; a stricter implementation may.
    #[error("conversion failed: {0}")]
    Conversion(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
