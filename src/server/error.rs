use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::jobs::JobError;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Error returned by the HTTP handlers, rendered as `{"error": message}`.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::MissingUrl | JobError::InvalidFormat(_) => {
                ApiError::BadRequest(err.to_string())
            }
            JobError::NotFound(_) => ApiError::NotFound(err.to_string()),
            JobError::DuplicateId(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = serde_json::json!({
            "error": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
