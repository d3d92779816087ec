// Error types for account and passport operations

use serde::Serialize;
use thiserror::Error;

use crate::flash::FlashMessage;

/// Result type alias for passport operations
pub type Result<T> = std::result::Result<T, PassportError>;

/// Account or passport attribute that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Attribute {
    Username,
    Email,
    Password,
}

impl Attribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Username => "username",
            Attribute::Email => "email",
            Attribute::Password => "password",
        }
    }
}

/// Record validation failure (uniqueness, format, required fields).
///
/// Storage reports these wrapped in `anyhow::Error`; callers recover them
/// with `downcast_ref::<ValidationError>()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed: {}", .invalid_attributes.iter().map(|a| a.as_str()).collect::<Vec<_>>().join(", "))]
pub struct ValidationError {
    pub invalid_attributes: Vec<Attribute>,
}

impl ValidationError {
    pub fn new(attribute: Attribute) -> Self {
        Self {
            invalid_attributes: vec![attribute],
        }
    }

    pub fn has(&self, attribute: Attribute) -> bool {
        self.invalid_attributes.contains(&attribute)
    }
}

/// Errors surfaced by the local protocol and passport reconciliation
#[derive(Debug, Error)]
pub enum PassportError {
    /// Neither the profile nor the request named a provider
    #[error("No authentication provider was identified.")]
    NoProvider,

    /// The provider profile has no email and no username
    #[error("Neither a username nor email was available")]
    NoIdentity,

    /// The strategy did not produce a provider identifier
    #[error("No identifier was returned by the provider")]
    MissingIdentifier,

    /// Record validation failed, optionally annotated for the UI
    #[error("{source}")]
    Validation {
        source: ValidationError,
        flash: Option<FlashMessage>,
    },

    /// Unsupported callback action for the current session
    #[error("Invalid action")]
    InvalidAction,

    /// The provider is not configured
    #[error("Unknown authentication provider: {0}")]
    UnknownProvider(String),

    /// No passport links the account to this provider
    #[error("No {0} passport is connected to this account")]
    NotConnected(String),

    /// OAuth state missing or mismatched
    #[error("Authorization state mismatch")]
    InvalidState,

    /// The provider rejected or failed the exchange
    #[error("Provider authentication failed: {0}")]
    Strategy(String),

    /// Storage or other internal failure
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl PassportError {
    /// Wrap a storage error, recovering validation failures.
    pub fn storage(err: anyhow::Error) -> Self {
        match err.downcast_ref::<ValidationError>() {
            Some(validation) => PassportError::Validation {
                source: validation.clone(),
                flash: None,
            },
            None => PassportError::Internal(err),
        }
    }

    pub fn validation(source: ValidationError) -> Self {
        PassportError::Validation {
            source,
            flash: None,
        }
    }

    /// Flash message to show the user, if any.
    pub fn flash(&self) -> Option<FlashMessage> {
        match self {
            PassportError::Validation { flash, .. } => *flash,
            _ => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, PassportError::Validation { .. })
    }

    pub fn strategy(msg: impl Into<String>) -> Self {
        PassportError::Strategy(msg.into())
    }
}
