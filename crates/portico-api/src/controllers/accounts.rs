// Account controller (admins and employees)
// Decision: One set of handlers; the router's AccountKind decides the namespace
// Decision: Admin registration requires an admin already acting on the request

use axum::{
    extract::{Path, State},
    Json,
};
use portico_core::{AccountKind, AccountView, PassportView};
use uuid::Uuid;

use super::ListResponse;
use crate::error::ApiError;
use crate::extract::{CurrentAccount, NOT_PERMITTED};
use crate::protocols::RegisterRequest;
use crate::state::KindState;

/// POST /register - Register an account with a local password
///
/// Mounted at `/register` for employees and `/admin/register` for admins.
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created", body = AccountView),
        (status = 400, description = "Invalid or duplicate username, email or password"),
        (status = 403, description = "Admin registration without an admin session"),
        (status = 500, description = "Internal server error")
    ),
    tag = "accounts"
)]
pub async fn create(
    State(state): State<KindState>,
    current: Option<CurrentAccount>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<AccountView>, ApiError> {
    if state.kind == AccountKind::Admin && current.is_none() {
        return Err(ApiError::forbidden(NOT_PERMITTED));
    }

    let account = state
        .app
        .passport
        .local()
        .register(state.kind, request)
        .await?;

    Ok(Json(account.view()))
}

/// GET /employee/me - The account acting on this request
///
/// Mounted at `/employee/me` and `/admin/me`.
#[utoipa::path(
    get,
    path = "/employee/me",
    responses(
        (status = 200, description = "Current account", body = AccountView),
        (status = 403, description = "Not authenticated as this kind of account")
    ),
    tag = "accounts"
)]
pub async fn me(CurrentAccount(account): CurrentAccount) -> Json<AccountView> {
    Json(account.view())
}

/// GET /employee/{id} - Get an account by ID
///
/// Only accounts of the same kind as the caller are visible, so an employee
/// session cannot read `/admin/{id}`.
#[utoipa::path(
    get,
    path = "/employee/{id}",
    params(("id" = Uuid, Path, description = "Account ID")),
    responses(
        (status = 200, description = "Account found", body = AccountView),
        (status = 403, description = "Not authenticated as this kind of account"),
        (status = 404, description = "Account not found")
    ),
    tag = "accounts"
)]
pub async fn find_one(
    State(state): State<KindState>,
    _current: CurrentAccount,
    Path(id): Path<Uuid>,
) -> Result<Json<AccountView>, ApiError> {
    let account = state
        .app
        .storage
        .get_account(state.kind, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("{} not found", state.kind)))?;

    Ok(Json(account.view()))
}

/// GET /employee/me/passports - Passports linked to the current account
#[utoipa::path(
    get,
    path = "/employee/me/passports",
    responses(
        (status = 200, description = "Linked passports", body = ListResponse<PassportView>),
        (status = 403, description = "Not authenticated as this kind of account")
    ),
    tag = "accounts"
)]
pub async fn passports(
    State(state): State<KindState>,
    CurrentAccount(account): CurrentAccount,
) -> Result<Json<ListResponse<PassportView>>, ApiError> {
    let passports = state.app.storage.list_passports(account.id).await?;
    Ok(Json(
        passports
            .iter()
            .map(PassportView::from)
            .collect::<Vec<_>>()
            .into(),
    ))
}
