// Database models (internal, may differ from public DTOs)

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use portico_core::{
    is_email, Account, AccountKind, Attribute, NewAccount, Passport, Protocol, Tokens,
    ValidationError,
};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================
// Accounts
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct AccountRow {
    pub id: Uuid,
    pub kind: String,
    pub username: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = anyhow::Error;

    fn try_from(row: AccountRow) -> Result<Self> {
        let kind = AccountKind::from_str(&row.kind)
            .ok_or_else(|| anyhow!("Unknown account kind in database: {}", row.kind))?;
        Ok(Account {
            id: row.id,
            kind,
            username: row.username,
            email: row.email,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Validated account input, ready to insert.
#[derive(Debug, Clone)]
pub struct CreateAccountRow {
    pub kind: AccountKind,
    pub username: String,
    pub email: Option<String>,
}

impl CreateAccountRow {
    /// Apply create-time defaults and field rules. Uniqueness is checked by
    /// the database itself.
    pub fn validate(
        kind: AccountKind,
        input: NewAccount,
    ) -> std::result::Result<Self, ValidationError> {
        let input = input.normalized();

        if let Some(email) = &input.email {
            if !is_email(email) {
                return Err(ValidationError::new(Attribute::Email));
            }
        }

        let username = input
            .username
            .ok_or_else(|| ValidationError::new(Attribute::Username))?;

        Ok(Self {
            kind,
            username,
            email: input.email,
        })
    }
}

// ============================================
// Passports
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct PassportRow {
    pub id: Uuid,
    pub account_id: Uuid,
    pub protocol: String,
    pub provider: Option<String>,
    pub identifier: Option<String>,
    pub tokens: Option<sqlx::types::JsonValue>,
    pub password: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PassportRow> for Passport {
    type Error = anyhow::Error;

    fn try_from(row: PassportRow) -> Result<Self> {
        let protocol = Protocol::from_str(&row.protocol)
            .ok_or_else(|| anyhow!("Unknown passport protocol in database: {}", row.protocol))?;
        let tokens = row
            .tokens
            .map(serde_json::from_value::<Tokens>)
            .transpose()?;
        Ok(Passport {
            id: row.id,
            account_id: row.account_id,
            protocol,
            provider: row.provider,
            identifier: row.identifier,
            tokens,
            password: row.password,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Passport input with the password already hashed.
#[derive(Debug, Clone)]
pub struct CreatePassportRow {
    pub account_id: Uuid,
    pub protocol: Protocol,
    pub provider: Option<String>,
    pub identifier: Option<String>,
    pub tokens: Option<Tokens>,
    pub password_hash: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_defaults_username() {
        let row = CreateAccountRow::validate(
            AccountKind::Employee,
            NewAccount {
                username: None,
                email: Some("new.admin@email.com".to_string()),
            },
        )
        .unwrap();
        assert_eq!(row.username, "new.admin@email.com");
    }

    #[test]
    fn test_validate_rejects_bad_email() {
        let err = CreateAccountRow::validate(
            AccountKind::Admin,
            NewAccount {
                username: Some("jane".to_string()),
                email: Some("not-an-email".to_string()),
            },
        )
        .unwrap_err();
        assert!(err.has(Attribute::Email));
    }

    #[test]
    fn test_validate_requires_some_identity() {
        let err = CreateAccountRow::validate(AccountKind::Admin, NewAccount::default()).unwrap_err();
        assert!(err.has(Attribute::Username));
    }

    #[test]
    fn test_row_conversion_rejects_unknown_kind() {
        let now = Utc::now();
        let row = AccountRow {
            id: Uuid::nil(),
            kind: "robot".to_string(),
            username: "r2".to_string(),
            email: None,
            created_at: now,
            updated_at: now,
        };
        assert!(Account::try_from(row).is_err());
    }
}
