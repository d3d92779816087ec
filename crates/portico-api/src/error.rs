// HTTP error responses
// Decision: JSON body {"error": ...} with the status carried alongside (not serialized)

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use portico_core::{Attribute, PassportError};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_attributes: Option<Vec<Attribute>>,
    #[serde(skip)]
    pub status: StatusCode,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            invalid_attributes: None,
            status,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<PassportError> for ApiError {
    fn from(err: PassportError) -> Self {
        match err {
            PassportError::Validation { source, .. } => {
                let mut api = ApiError::bad_request(source.to_string());
                api.invalid_attributes = Some(source.invalid_attributes);
                api
            }
            PassportError::NotConnected(_) | PassportError::UnknownProvider(_) => {
                ApiError::not_found(err.to_string())
            }
            PassportError::InvalidAction
            | PassportError::InvalidState
            | PassportError::NoProvider
            | PassportError::NoIdentity
            | PassportError::MissingIdentifier => ApiError::bad_request(err.to_string()),
            PassportError::Strategy(_) => {
                tracing::warn!(error = %err, "Provider authentication failed");
                ApiError::unauthorized(err.to_string())
            }
            PassportError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                ApiError::internal()
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        PassportError::storage(err).into()
    }
}
