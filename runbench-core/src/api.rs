//! Wire types shared with the HTTP boundary.

use runbench_model::{Run, RunId, RunStatus};
use serde::{Deserialize, Serialize};

/// Standard API envelope used by the REST surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: String) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(error),
        }
    }
}

/// Returned by submit: the id plus the status the run was admitted with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunAccepted {
    pub run_id: RunId,
    pub status: RunStatus,
}

impl From<&Run> for RunAccepted {
    fn from(run: &Run) -> Self {
        Self {
            run_id: run.id,
            status: run.status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunListResponse {
    pub runs: Vec<Run>,
    pub count: usize,
}

/// Operational snapshot for the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    pub queue_depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_run: Option<RunId>,
}
