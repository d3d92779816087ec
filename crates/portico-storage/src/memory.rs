// In-memory storage implementation for dev mode and tests
// Decision: Use parking_lot for thread-safe access
// Decision: UUIDs generated via uuid v7 (time-ordered)
//
// Mirrors the PostgreSQL schema, including the per-kind uniqueness
// constraints on username and email and cascade delete of passports.

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use portico_core::{Account, AccountKind, Attribute, Passport, Tokens, ValidationError};
use std::collections::HashMap;
use uuid::Uuid;

use super::models::*;

/// In-memory database for dev mode
/// All data is stored in memory and lost on restart
#[derive(Default)]
pub struct InMemoryDatabase {
    accounts: RwLock<HashMap<Uuid, Account>>,
    passports: RwLock<HashMap<Uuid, Passport>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    // ============================================
    // Accounts
    // ============================================

    pub async fn create_account(&self, input: CreateAccountRow) -> Result<Account> {
        let mut accounts = self.accounts.write();

        let mut invalid = Vec::new();
        if accounts
            .values()
            .any(|a| a.kind == input.kind && a.username == input.username)
        {
            invalid.push(Attribute::Username);
        }
        if input.email.is_some()
            && accounts
                .values()
                .any(|a| a.kind == input.kind && a.email == input.email)
        {
            invalid.push(Attribute::Email);
        }
        if !invalid.is_empty() {
            return Err(ValidationError {
                invalid_attributes: invalid,
            }
            .into());
        }

        let now = Self::now();
        let account = Account {
            id: Uuid::now_v7(),
            kind: input.kind,
            username: input.username,
            email: input.email,
            created_at: now,
            updated_at: now,
        };
        accounts.insert(account.id, account.clone());
        Ok(account)
    }

    pub async fn get_account(&self, kind: AccountKind, id: Uuid) -> Result<Option<Account>> {
        Ok(self
            .accounts
            .read()
            .get(&id)
            .filter(|a| a.kind == kind)
            .cloned())
    }

    pub async fn get_account_by_email(
        &self,
        kind: AccountKind,
        email: &str,
    ) -> Result<Option<Account>> {
        Ok(self
            .accounts
            .read()
            .values()
            .find(|a| a.kind == kind && a.email.as_deref() == Some(email))
            .cloned())
    }

    pub async fn get_account_by_username(
        &self,
        kind: AccountKind,
        username: &str,
    ) -> Result<Option<Account>> {
        Ok(self
            .accounts
            .read()
            .values()
            .find(|a| a.kind == kind && a.username == username)
            .cloned())
    }

    pub async fn delete_account(&self, kind: AccountKind, id: Uuid) -> Result<bool> {
        let mut accounts = self.accounts.write();
        if !accounts.get(&id).is_some_and(|a| a.kind == kind) {
            return Ok(false);
        }
        accounts.remove(&id);
        // Cascade delete passports
        self.passports.write().retain(|_, p| p.account_id != id);
        Ok(true)
    }

    // ============================================
    // Passports
    // ============================================

    pub async fn create_passport(&self, input: CreatePassportRow) -> Result<Passport> {
        // Foreign key on account_id
        if !self.accounts.read().contains_key(&input.account_id) {
            anyhow::bail!("Account {} does not exist", input.account_id);
        }

        let now = Self::now();
        let passport = Passport {
            id: Uuid::now_v7(),
            account_id: input.account_id,
            protocol: input.protocol,
            provider: input.provider,
            identifier: input.identifier,
            tokens: input.tokens,
            password: input.password_hash,
            created_at: now,
            updated_at: now,
        };
        self.passports.write().insert(passport.id, passport.clone());
        Ok(passport)
    }

    pub async fn get_local_passport(&self, account_id: Uuid) -> Result<Option<Passport>> {
        Ok(self
            .passports
            .read()
            .values()
            .filter(|p| p.account_id == account_id && p.is_local())
            .min_by_key(|p| p.created_at)
            .cloned())
    }

    pub async fn get_passport_by_identity(
        &self,
        kind: AccountKind,
        provider: &str,
        identifier: &str,
    ) -> Result<Option<Passport>> {
        let accounts = self.accounts.read();
        Ok(self
            .passports
            .read()
            .values()
            .filter(|p| {
                p.provider.as_deref() == Some(provider)
                    && p.identifier.as_deref() == Some(identifier)
            })
            .find(|p| accounts.get(&p.account_id).is_some_and(|a| a.kind == kind))
            .cloned())
    }

    pub async fn get_account_passport(
        &self,
        account_id: Uuid,
        provider: &str,
    ) -> Result<Option<Passport>> {
        Ok(self
            .passports
            .read()
            .values()
            .filter(|p| p.account_id == account_id && p.provider.as_deref() == Some(provider))
            .min_by_key(|p| p.created_at)
            .cloned())
    }

    pub async fn list_passports(&self, account_id: Uuid) -> Result<Vec<Passport>> {
        let mut result: Vec<_> = self
            .passports
            .read()
            .values()
            .filter(|p| p.account_id == account_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(result)
    }

    pub async fn update_passport_tokens(
        &self,
        id: Uuid,
        tokens: Option<Tokens>,
    ) -> Result<Option<Passport>> {
        let mut passports = self.passports.write();
        if let Some(passport) = passports.get_mut(&id) {
            passport.tokens = tokens;
            passport.updated_at = Self::now();
            return Ok(Some(passport.clone()));
        }
        Ok(None)
    }

    pub async fn delete_passport(&self, id: Uuid) -> Result<bool> {
        Ok(self.passports.write().remove(&id).is_some())
    }
}
