// Passport domain types
//
// A passport links one account to one authentication method: the local
// password, or an identity at a third-party provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Authentication protocol a passport was issued through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Local,
    OAuth,
    OAuth2,
    OpenId,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Local => "local",
            Protocol::OAuth => "oauth",
            Protocol::OAuth2 => "oauth2",
            Protocol::OpenId => "openid",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "local" => Some(Protocol::Local),
            "oauth" => Some(Protocol::OAuth),
            "oauth2" => Some(Protocol::OAuth2),
            "openid" => Some(Protocol::OpenId),
            _ => None,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider tokens stored on a third-party passport.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Tokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    /// Anything else the provider returned (id_token, scope, ...)
    #[serde(flatten)]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Stored passport.
#[derive(Debug, Clone, PartialEq)]
pub struct Passport {
    pub id: Uuid,
    pub account_id: Uuid,
    pub protocol: Protocol,
    pub provider: Option<String>,
    pub identifier: Option<String>,
    pub tokens: Option<Tokens>,
    /// Argon2id PHC string; only local passports carry one
    pub password: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Passport {
    pub fn is_local(&self) -> bool {
        self.protocol == Protocol::Local
    }

    pub fn view(&self) -> PassportView {
        PassportView::from(self)
    }
}

/// Input for creating a passport. `password` is plaintext here; storage
/// hashes it before it is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPassport {
    pub account_id: Uuid,
    pub protocol: Protocol,
    pub provider: Option<String>,
    pub identifier: Option<String>,
    pub tokens: Option<Tokens>,
    pub password: Option<String>,
}

impl NewPassport {
    pub fn local(account_id: Uuid, password: Option<String>) -> Self {
        Self {
            account_id,
            protocol: Protocol::Local,
            provider: None,
            identifier: None,
            tokens: None,
            password,
        }
    }

    /// Third-party passport built from a reconciliation query.
    pub fn from_query(account_id: Uuid, query: &PassportQuery, provider: &str) -> Self {
        Self {
            account_id,
            protocol: query.protocol,
            provider: Some(provider.to_string()),
            identifier: query.identifier.clone(),
            tokens: query.tokens.clone(),
            password: None,
        }
    }
}

/// Public representation of a passport (no password, no tokens).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct PassportView {
    pub id: Uuid,
    pub protocol: Protocol,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Passport> for PassportView {
    fn from(passport: &Passport) -> Self {
        Self {
            id: passport.id,
            protocol: passport.protocol,
            provider: passport.provider.clone(),
            identifier: passport.identifier.clone(),
            created_at: passport.created_at,
        }
    }
}

/// What a strategy knows about the passport it is reconciling.
#[derive(Debug, Clone, PartialEq)]
pub struct PassportQuery {
    pub protocol: Protocol,
    /// Provider from the request path; used when the profile has none
    pub provider: Option<String>,
    pub identifier: Option<String>,
    pub tokens: Option<Tokens>,
}

/// Single email entry of a provider profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileEmail {
    pub value: String,
    #[serde(default)]
    pub verified: bool,
}

/// Normalized profile returned by a third-party provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub emails: Vec<ProfileEmail>,
}

impl Profile {
    pub fn primary_email(&self) -> Option<&str> {
        self.emails.first().map(|e| e.value.as_str())
    }
}
