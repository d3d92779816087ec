// Storage backend abstraction
// Decision: Use enum dispatch for simplicity over trait objects
// Decision: Hash local passwords here, once, before either backend sees them
//
// This module provides a unified StorageBackend enum that can work with
// either PostgreSQL (production) or in-memory (dev mode) storage.

use anyhow::Result;
use portico_core::{
    Account, AccountKind, Attribute, NewAccount, NewPassport, Passport, Protocol, Tokens,
    ValidationError,
};
use std::sync::Arc;
use uuid::Uuid;

use super::memory::InMemoryDatabase;
use super::models::*;
use super::password::hash_password;
use super::repositories::Database;

/// Storage backend that can be either PostgreSQL or in-memory
#[derive(Clone)]
pub enum StorageBackend {
    /// PostgreSQL database (production)
    Postgres(Database),
    /// In-memory database (dev mode)
    InMemory(Arc<InMemoryDatabase>),
}

impl StorageBackend {
    /// Create a PostgreSQL storage backend from a database URL and apply migrations
    pub async fn postgres(database_url: &str) -> Result<Self> {
        let db = Database::from_url(database_url).await?;
        db.migrate().await?;
        Ok(Self::Postgres(db))
    }

    /// Create an in-memory storage backend
    pub fn in_memory() -> Self {
        Self::InMemory(Arc::new(InMemoryDatabase::new()))
    }

    /// Check if this is dev mode (in-memory)
    pub fn is_dev_mode(&self) -> bool {
        matches!(self, Self::InMemory(_))
    }

    // ============================================
    // Accounts
    // ============================================

    /// Validate and create an account. Field and uniqueness failures come
    /// back as an `anyhow::Error` wrapping `ValidationError`.
    pub async fn create_account(&self, kind: AccountKind, input: NewAccount) -> Result<Account> {
        let row = CreateAccountRow::validate(kind, input)?;
        match self {
            Self::Postgres(db) => db.create_account(row).await,
            Self::InMemory(db) => db.create_account(row).await,
        }
    }

    pub async fn get_account(&self, kind: AccountKind, id: Uuid) -> Result<Option<Account>> {
        match self {
            Self::Postgres(db) => db.get_account(kind, id).await,
            Self::InMemory(db) => db.get_account(kind, id).await,
        }
    }

    pub async fn get_account_by_email(
        &self,
        kind: AccountKind,
        email: &str,
    ) -> Result<Option<Account>> {
        match self {
            Self::Postgres(db) => db.get_account_by_email(kind, email).await,
            Self::InMemory(db) => db.get_account_by_email(kind, email).await,
        }
    }

    pub async fn get_account_by_username(
        &self,
        kind: AccountKind,
        username: &str,
    ) -> Result<Option<Account>> {
        match self {
            Self::Postgres(db) => db.get_account_by_username(kind, username).await,
            Self::InMemory(db) => db.get_account_by_username(kind, username).await,
        }
    }

    pub async fn delete_account(&self, kind: AccountKind, id: Uuid) -> Result<bool> {
        match self {
            Self::Postgres(db) => db.delete_account(kind, id).await,
            Self::InMemory(db) => db.delete_account(kind, id).await,
        }
    }

    // ============================================
    // Passports
    // ============================================

    /// Create a passport. Local passports must carry a non-empty password,
    /// which is hashed before it is stored.
    pub async fn create_passport(&self, input: NewPassport) -> Result<Passport> {
        let password_hash = match (input.protocol, input.password.as_deref()) {
            (Protocol::Local, Some(password)) if !password.is_empty() => {
                Some(hash_password(password)?)
            }
            (Protocol::Local, _) => return Err(ValidationError::new(Attribute::Password).into()),
            (_, _) => None,
        };

        let row = CreatePassportRow {
            account_id: input.account_id,
            protocol: input.protocol,
            provider: input.provider,
            identifier: input.identifier,
            tokens: input.tokens,
            password_hash,
        };

        match self {
            Self::Postgres(db) => db.create_passport(row).await,
            Self::InMemory(db) => db.create_passport(row).await,
        }
    }

    pub async fn get_local_passport(&self, account_id: Uuid) -> Result<Option<Passport>> {
        match self {
            Self::Postgres(db) => db.get_local_passport(account_id).await,
            Self::InMemory(db) => db.get_local_passport(account_id).await,
        }
    }

    /// Passport issued by `provider` for `identifier`, among accounts of `kind`
    pub async fn get_passport_by_identity(
        &self,
        kind: AccountKind,
        provider: &str,
        identifier: &str,
    ) -> Result<Option<Passport>> {
        match self {
            Self::Postgres(db) => db.get_passport_by_identity(kind, provider, identifier).await,
            Self::InMemory(db) => db.get_passport_by_identity(kind, provider, identifier).await,
        }
    }

    pub async fn get_account_passport(
        &self,
        account_id: Uuid,
        provider: &str,
    ) -> Result<Option<Passport>> {
        match self {
            Self::Postgres(db) => db.get_account_passport(account_id, provider).await,
            Self::InMemory(db) => db.get_account_passport(account_id, provider).await,
        }
    }

    pub async fn list_passports(&self, account_id: Uuid) -> Result<Vec<Passport>> {
        match self {
            Self::Postgres(db) => db.list_passports(account_id).await,
            Self::InMemory(db) => db.list_passports(account_id).await,
        }
    }

    pub async fn update_passport_tokens(
        &self,
        id: Uuid,
        tokens: Option<Tokens>,
    ) -> Result<Option<Passport>> {
        match self {
            Self::Postgres(db) => db.update_passport_tokens(id, tokens).await,
            Self::InMemory(db) => db.update_passport_tokens(id, tokens).await,
        }
    }

    pub async fn delete_passport(&self, id: Uuid) -> Result<bool> {
        match self {
            Self::Postgres(db) => db.delete_passport(id).await,
            Self::InMemory(db) => db.delete_passport(id).await,
        }
    }
}
