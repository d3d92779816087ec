// HTTP Basic authentication policy
// Decision: Requests without Basic credentials pass through untouched
// Decision: In production, credentials over plain HTTP are refused before they are checked

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose, Engine as _};

use crate::error::ApiError;
use crate::extract::RequestAccount;
use crate::protocols::LoginOutcome;
use crate::session::Session;
use crate::state::KindState;

pub const HTTPS_REQUIRED: &str = "https required for basic auth. refusing login request";

/// Decode a Basic credential payload into (user, password). The password
/// may itself contain ':'.
pub fn decode_credentials(encoded: &str) -> Option<(String, String)> {
    let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

/// Whether the request reached us over TLS, directly or behind a proxy
pub fn is_secure(request: &Request) -> bool {
    if request.uri().scheme_str() == Some("https") {
        return true;
    }
    request
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
}

fn basic_payload(request: &Request) -> Option<String> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .map(str::to_string)
}

/// Authenticate the request from an `Authorization: Basic` header.
pub async fn basic_auth(
    State(state): State<KindState>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(payload) = basic_payload(&request) else {
        return next.run(request).await;
    };

    if state.app.config.environment.is_production() && !is_secure(&request) {
        tracing::warn!("Basic auth attempted over an insecure connection");
        return ApiError::forbidden(HTTPS_REQUIRED).into_response();
    }

    let Some((user, password)) = decode_credentials(&payload) else {
        session.set_authenticated(false);
        return ApiError::forbidden("Could not authenticate").into_response();
    };

    match state
        .app
        .passport
        .local()
        .login(state.kind, &user, &password)
        .await
    {
        Ok(LoginOutcome::Authenticated { account, passport }) => {
            tracing::debug!(kind = %state.kind, account_id = %account.id, "Basic auth succeeded");
            session.set_authenticated(true);
            session.set_passport(Some(passport.id));
            request.extensions_mut().insert(RequestAccount(account));
            next.run(request).await
        }
        Ok(LoginOutcome::Rejected(flash)) => {
            tracing::info!(kind = %state.kind, reason = %flash, "Basic auth rejected");
            session.set_authenticated(false);
            ApiError::forbidden(format!("Could not authenticate {}", user)).into_response()
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}
