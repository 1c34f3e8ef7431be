use runbench_model::RunId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("invalid request: field `{field}`: {reason}")]
    InvalidRequest { field: String, reason: String },

    #[error("run not found: {0}")]
    NotFound(RunId),

    #[error("failed to spawn process: {0}")]
    Spawn(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<runbench_model::ModelError> for RunError {
    fn from(err: runbench_model::ModelError) -> Self {
        RunError::InvalidRequest {
            field: err.field().to_string(),
            reason: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RunError>;
