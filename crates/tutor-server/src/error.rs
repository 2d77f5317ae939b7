use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use thiserror::Error;
use tutor_core::{HttpError, MessageId};

/// Errors returned by the HTTP handlers before a stream starts
#[derive(Debug, Error)]
pub enum ServerError {
    /// The user identity header is absent or empty
    #[error("missing user identity")]
    MissingUser,

    /// Request body failed validation
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No in-flight response with this id for the caller
    #[error("no active response {0}")]
    ResponseNotFound(MessageId),

    /// The upstream provider could not be opened
    #[error("upstream unavailable: {0}")]
    Upstream(String),
}

impl HttpError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingUser => StatusCode::UNAUTHORIZED,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::ResponseNotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::MissingUser => "authentication_error",
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::ResponseNotFound(_) => "not_found_error",
            Self::Upstream(_) => "upstream_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Upstream(_) => "the AI provider is unavailable".to_owned(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "message": self.client_message(),
                "type": self.error_type(),
            }
        });

        (self.status_code(), Json(body)).into_response()
    }
}
