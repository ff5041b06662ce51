use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::utils::error::GateError;

#[derive(Debug)]
pub enum ApiError {
    InvalidRequest(String),
    Unauthorized(String),
    ServiceUnavailable(String),
    InternalError(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::InvalidRequest(msg) => write!(f, "Invalid Request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service Unavailable: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal Server Error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::InvalidRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::ServiceUnavailable(msg)
            | ApiError::InternalError(msg) => msg,
        };

        let body = Json(serde_json::json!({
            "error": message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Database(_) | GateError::Redis(_) | GateError::Other(_) => {
                ApiError::ServiceUnavailable(err.to_string())
            }
            _ => ApiError::InternalError(err.to_string()),
        }
    }
}
