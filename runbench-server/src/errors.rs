use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use runbench_core::{RunError, api::ApiResponse};

/// HTTP projection of core errors; every handler funnels through this.
#[derive(Debug)]
pub struct RunHttpError {
    status: StatusCode,
    message: String,
}

impl RunHttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl From<RunError> for RunHttpError {
    fn from(error: RunError) -> Self {
        let status = match &error {
            RunError::InvalidRequest { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            RunError::NotFound(_) => StatusCode::NOT_FOUND,
            RunError::Spawn(_)
            | RunError::Io(_)
            | RunError::Serialization(_)
            | RunError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for RunHttpError {
    fn into_response(self) -> axum::response::Response {
        let payload = Json(ApiResponse::<()>::error(self.message));
        (self.status, payload).into_response()
    }
}
