// Authentication controller
// Decision: Failed callbacks flash the error and the submitted form, then send the user back
// Decision: A successful callback answers with the account as JSON, plus a 302 when `next` is given

use axum::{
    extract::{FromRequest, Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use portico_core::{AccountView, FlashMessage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::{IntoParams, ToSchema};

use crate::error::ApiError;
use crate::extract::{CurrentAccount, SessionAccount};
use crate::passport::{CallbackOutcome, CallbackParams, CallbackRequest, LOCAL_PROVIDER};
use crate::session::Session;
use crate::state::KindState;

// Alias so utoipa's axum path-param inference skips optional path extractors
// (it panics on `Option<Path<_>>`); params are declared explicitly instead.
type OptionalPath<T> = Path<T>;

/// `?next=` redirect target
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct NextQuery {
    pub next: Option<String>,
}

/// 302 Found with a Location header
pub(crate) fn found(location: impl Into<String>) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.into())]).into_response()
}

/// Callback body: JSON or URL-encoded form, anything else is ignored.
pub struct CallbackBody(pub CallbackParams);

#[axum::async_trait]
impl<S> FromRequest<S> for CallbackBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("application/json") {
            let Json(params) = Json::<CallbackParams>::from_request(request, state)
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?;
            Ok(CallbackBody(params))
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(params) = Form::<CallbackParams>::from_request(request, state)
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?;
            Ok(CallbackBody(params))
        } else {
            Ok(CallbackBody(CallbackParams::default()))
        }
    }
}

/// GET /logout - Log out and redirect to `next` or `/`
#[utoipa::path(
    get,
    path = "/logout",
    params(NextQuery),
    responses(
        (status = 302, description = "Logged out, redirecting")
    ),
    tag = "auth"
)]
pub async fn logout(session: Session, Query(query): Query<NextQuery>) -> Response {
    if let Some(principal) = session.principal() {
        tracing::info!(kind = %principal.kind, account_id = %principal.account_id, "Logged out");
    }
    session.logout();
    found(query.next.unwrap_or_else(|| "/".to_string()))
}

/// Flash left by the previous failed attempt
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct FlashResponse {
    /// Flash key, e.g. `Error.Passport.Password.Wrong`
    pub error: Option<String>,
    /// Submitted form without secrets
    #[schema(value_type = Option<Object>)]
    pub form: Option<serde_json::Value>,
}

/// GET /flash - Read and clear the flash for the login and register pages
#[utoipa::path(
    get,
    path = "/flash",
    responses(
        (status = 200, description = "Pending flash, empty when there is none", body = FlashResponse)
    ),
    tag = "auth"
)]
pub async fn flash(session: Session) -> Json<FlashResponse> {
    Json(FlashResponse {
        error: session.take_flash_error(),
        form: session.take_flash_form(),
    })
}

/// GET /auth/:provider - Redirect to the provider for authorization
#[utoipa::path(
    get,
    path = "/auth/{provider}",
    params(("provider" = String, Path, description = "Provider name")),
    responses(
        (status = 302, description = "Redirect to the provider, or to /login for unknown providers")
    ),
    tag = "auth"
)]
pub async fn provider(
    State(state): State<KindState>,
    session: Session,
    Path(provider): Path<String>,
) -> Result<Response, ApiError> {
    match state.app.passport.endpoint(state.kind, &provider)? {
        Some(authorization) => {
            session.set_oauth_state(authorization.state);
            Ok(found(authorization.url))
        }
        None => Ok(found("/login")),
    }
}

/// POST /auth/local[/:action], GET /auth/:provider/callback, GET /auth/:provider/:action
#[utoipa::path(
    post,
    path = "/auth/local/{action}",
    params(
        ("action" = String, Path, description = "register, connect, disconnect or login"),
        NextQuery
    ),
    request_body = CallbackParams,
    responses(
        (status = 200, description = "Authenticated account", body = portico_core::AccountView),
        (status = 302, description = "Authenticated and redirected to `next`, or failed and sent back"),
        (status = 403, description = "Authentication failed")
    ),
    tag = "auth"
)]
#[allow(clippy::too_many_arguments)]
pub async fn callback(
    State(state): State<KindState>,
    session: Session,
    SessionAccount(session_account): SessionAccount,
    path: Option<OptionalPath<HashMap<String, String>>>,
    Query(next): Query<NextQuery>,
    Query(query): Query<CallbackParams>,
    headers: HeaderMap,
    CallbackBody(body): CallbackBody,
) -> Response {
    let path = path.map(|Path(p)| p).unwrap_or_default();
    let provider = path
        .get("provider")
        .cloned()
        .unwrap_or_else(|| LOCAL_PROVIDER.to_string());
    let action = path.get("action").cloned();

    let params = body.merge(query);
    let form = params.form();
    let expected_state = if provider == LOCAL_PROVIDER {
        None
    } else {
        session.take_oauth_state()
    };

    let request = CallbackRequest {
        provider,
        action: action.clone(),
        session_account,
        params,
        expected_state,
    };

    match state.app.passport.callback(state.kind, request).await {
        Ok(CallbackOutcome::LoggedIn {
            account,
            passport_id,
        }) => {
            session.login(&account, passport_id.or_else(|| session.passport_id()));
            tracing::info!(
                kind = %account.kind,
                account_id = %account.id,
                "Authenticated successfully"
            );

            let body = Json(account.view());
            match next.next {
                Some(location) => {
                    (StatusCode::FOUND, [(header::LOCATION, location)], body).into_response()
                }
                None => body.into_response(),
            }
        }
        Ok(CallbackOutcome::Rejected(flash)) => {
            tracing::warn!(flash = %flash, "Authentication rejected");
            try_again(&session, action.as_deref(), flash, form, &headers)
        }
        Err(err) => {
            tracing::warn!(error = %err, "Authentication failed");
            let flash = err.flash().unwrap_or(FlashMessage::Generic);
            try_again(&session, action.as_deref(), flash, form, &headers)
        }
    }
}

/// Send the user back to where the attempt started.
///
/// Only flash keys reach the client; errors without one get the generic key.
/// The flash replaces whatever an earlier attempt left behind.
fn try_again(
    session: &Session,
    action: Option<&str>,
    flash: FlashMessage,
    form: serde_json::Value,
    headers: &HeaderMap,
) -> Response {
    session.flash_error(flash);
    session.flash_form(form);

    match action {
        Some("register") => found("/register"),
        Some("login") => found("/login"),
        Some("disconnect") => {
            let back = headers
                .get(header::REFERER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("/")
                .to_string();
            found(back)
        }
        _ => ApiError::forbidden(flash.key()).into_response(),
    }
}

/// DELETE /auth/:provider - Remove the current account's passport for a provider
///
/// `DELETE /auth/local` removes the local password.
#[utoipa::path(
    delete,
    path = "/auth/{provider}",
    params(("provider" = String, Path, description = "Provider name")),
    responses(
        (status = 200, description = "Passport removed", body = portico_core::AccountView),
        (status = 403, description = "Not logged in"),
        (status = 404, description = "No passport for this provider")
    ),
    tag = "auth"
)]
pub async fn disconnect(
    State(state): State<KindState>,
    provider: Option<OptionalPath<String>>,
    CurrentAccount(account): CurrentAccount,
) -> Result<Json<AccountView>, ApiError> {
    let provider = provider
        .map(|Path(p)| p)
        .unwrap_or_else(|| LOCAL_PROVIDER.to_string());
    let account = if provider == LOCAL_PROVIDER {
        state.app.passport.local().disconnect(account).await?
    } else {
        state.app.passport.disconnect(account, &provider).await?
    };
    Ok(Json(account.view()))
}
