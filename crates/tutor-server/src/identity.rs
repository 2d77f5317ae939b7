use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::HeaderName;
use tutor_core::UserId;

use crate::error::ServerError;

/// Resolve the caller from the identity header set by the auth layer
///
/// The authenticated [`UserId`] is inserted as a request extension;
/// requests without one are rejected with 401.
pub async fn user_identity_middleware(header: &HeaderName, mut request: Request, next: Next) -> Response {
    let user = request
        .headers()
        .get(header)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(UserId::new);

    let Some(user) = user else {
        tracing::debug!(header = %header, "request without user identity");
        return ServerError::MissingUser.into_response();
    };

    request.extensions_mut().insert(user);
    next.run(request).await
}
