// Account domain types
//
// Admin and Employee accounts share one shape. The kind partitions the
// namespace: usernames and emails are unique per kind, not globally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use md5::{Digest, Md5};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

const GRAVATAR_BASE_URL: &str = "https://gravatar.com/avatar/";

/// Which account namespace a record belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Admin,
    Employee,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Admin => "admin",
            AccountKind::Employee => "employee",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(AccountKind::Admin),
            "employee" => Some(AccountKind::Employee),
            _ => None,
        }
    }
}

impl std::fmt::Display for AccountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A local account (admin or employee).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub kind: AccountKind,
    pub username: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn gravatar_url(&self) -> String {
        gravatar_url(self.email.as_deref())
    }

    /// Public representation; never carries credentials.
    pub fn view(&self) -> AccountView {
        AccountView::from(self)
    }
}

/// Input for creating an account.
///
/// Passwords never travel on this type: the local protocol strips them
/// before the account is created and hands them to the local passport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewAccount {
    pub username: Option<String>,
    pub email: Option<String>,
}

impl NewAccount {
    /// Apply the create-time defaults: blank fields become `None` and a
    /// missing username falls back to the email.
    pub fn normalized(self) -> Self {
        let email = self
            .email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
        let username = self
            .username
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .or_else(|| email.clone());

        Self { username, email }
    }
}

/// Serialized form of an account returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct AccountView {
    pub id: Uuid,
    pub kind: AccountKind,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub gravatar_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            kind: account.kind,
            username: account.username.clone(),
            email: account.email.clone(),
            gravatar_url: account.gravatar_url(),
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

/// Gravatar URL for an email address: MD5 of the address as stored, an
/// account without email hashes the empty string.
pub fn gravatar_url(email: Option<&str>) -> String {
    let digest = Md5::digest(email.unwrap_or_default().as_bytes());
    format!("{}{}", GRAVATAR_BASE_URL, hex::encode(digest))
}
