use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentFlowError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Agent {0} not found")]
    AgentNotFound(String),

    #[error("Record set not found: {0}")]
    RecordSetNotFound(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid agent update: {0}")]
    InvalidAgent(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, AgentFlowError>;

/// Error returned by HTTP handlers. Rendered as `{"error": "<message>"}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<AgentFlowError> for ApiError {
    fn from(err: AgentFlowError) -> Self {
        match err {
            AgentFlowError::AgentNotFound(_)
            | AgentFlowError::RecordSetNotFound(_)
            | AgentFlowError::JobNotFound(_) => ApiError::NotFound(err.to_string()),
            AgentFlowError::InvalidAgent(_) => ApiError::BadRequest(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_variants_map_to_404() {
        let err: ApiError = AgentFlowError::AgentNotFound("slr-screener".into()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Agent slr-screener not found");

        let err: ApiError = AgentFlowError::RecordSetNotFound("abc".into()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_invalid_agent_maps_to_400() {
        let err: ApiError = AgentFlowError::InvalidAgent("role: expected a string".into()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_storage_error_maps_to_500() {
        let err: ApiError = AgentFlowError::Storage("disk full".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_bad_request_response_status() {
        let resp = ApiError::BadRequest("title is required".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
