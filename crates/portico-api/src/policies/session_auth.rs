// Session policy
// Decision: A single boolean gate on the session; no roles, no token refresh

use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::extract::NOT_PERMITTED;
use crate::session::Session;

/// Let the request through only when the session is authenticated.
pub async fn session_auth(session: Session, request: Request, next: Next) -> Response {
    if session.is_authenticated() {
        return next.run(request).await;
    }

    tracing::debug!(path = %request.uri().path(), "Unauthenticated session rejected");
    ApiError::forbidden(NOT_PERMITTED).into_response()
}
