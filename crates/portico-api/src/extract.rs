// Account extractors
// Decision: The session stores (kind, id) only; the account is reloaded on every request
// Decision: Basic auth puts a request-scoped account in the extensions, which wins over the session

use axum::{extract::FromRequestParts, http::request::Parts};
use portico_core::Account;

use crate::error::ApiError;
use crate::session::Session;
use crate::state::KindState;

pub const NOT_PERMITTED: &str = "You are not permitted to perform this action.";

/// Account authenticated for this request only (HTTP Basic)
#[derive(Debug, Clone)]
pub struct RequestAccount(pub Account);

/// Account logged into the session, if it belongs to the router's kind.
#[derive(Debug, Clone)]
pub struct SessionAccount(pub Option<Account>);

#[axum::async_trait]
impl FromRequestParts<KindState> for SessionAccount {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &KindState,
    ) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;

        let Some(principal) = session.principal() else {
            return Ok(SessionAccount(None));
        };
        if principal.kind != state.kind {
            return Ok(SessionAccount(None));
        }

        let account = state
            .app
            .passport
            .deserialize(principal.kind, principal.account_id)
            .await?;
        if account.is_none() {
            tracing::debug!(account_id = %principal.account_id, "Session account no longer exists");
        }

        Ok(SessionAccount(account))
    }
}

/// The account acting on this request: basic auth first, then the session.
/// Rejects with 403 when there is none.
#[derive(Debug, Clone)]
pub struct CurrentAccount(pub Account);

#[axum::async_trait]
impl FromRequestParts<KindState> for CurrentAccount {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &KindState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(RequestAccount(account)) = parts.extensions.get::<RequestAccount>() {
            if account.kind == state.kind {
                return Ok(CurrentAccount(account.clone()));
            }
            return Err(ApiError::forbidden(NOT_PERMITTED));
        }

        match SessionAccount::from_request_parts(parts, state).await? {
            SessionAccount(Some(account)) => Ok(CurrentAccount(account)),
            SessionAccount(None) => Err(ApiError::forbidden(NOT_PERMITTED)),
        }
    }
}
