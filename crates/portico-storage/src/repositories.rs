// Repository layer for PostgreSQL
// Decision: Unique violations surface as ValidationError so callers can flash them

use anyhow::Result;
use portico_core::{Account, AccountKind, Attribute, Passport, Tokens, ValidationError};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::*;

const ACCOUNT_COLUMNS: &str = "id, kind, username, email, created_at, updated_at";
const PASSPORT_COLUMNS: &str =
    "id, account_id, protocol, provider, identifier, tokens, password, created_at, updated_at";

/// Turn a unique-constraint violation into a ValidationError naming the
/// offending attribute.
fn map_constraint_error(err: sqlx::Error) -> anyhow::Error {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let attribute = match db_err.constraint() {
                Some("accounts_kind_email_key") => Attribute::Email,
                _ => Attribute::Username,
            };
            return ValidationError::new(attribute).into();
        }
    }
    err.into()
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create database connection from URL
    pub async fn from_url(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply embedded migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    // ============================================
    // Accounts
    // ============================================

    pub async fn create_account(&self, input: CreateAccountRow) -> Result<Account> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            INSERT INTO accounts (id, kind, username, email)
            VALUES ($1, $2, $3, $4)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(Uuid::now_v7())
        .bind(input.kind.as_str())
        .bind(&input.username)
        .bind(&input.email)
        .fetch_one(&self.pool)
        .await
        .map_err(map_constraint_error)?;

        Account::try_from(row)
    }

    pub async fn get_account(&self, kind: AccountKind, id: Uuid) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 AND kind = $2"
        ))
        .bind(id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Account::try_from).transpose()
    }

    pub async fn get_account_by_email(
        &self,
        kind: AccountKind,
        email: &str,
    ) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1 AND kind = $2"
        ))
        .bind(email)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Account::try_from).transpose()
    }

    pub async fn get_account_by_username(
        &self,
        kind: AccountKind,
        username: &str,
    ) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = $1 AND kind = $2"
        ))
        .bind(username)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Account::try_from).transpose()
    }

    pub async fn delete_account(&self, kind: AccountKind, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1 AND kind = $2")
            .bind(id)
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ============================================
    // Passports
    // ============================================

    pub async fn create_passport(&self, input: CreatePassportRow) -> Result<Passport> {
        let tokens = input.tokens.map(serde_json::to_value).transpose()?;

        let row = sqlx::query_as::<_, PassportRow>(&format!(
            r#"
            INSERT INTO passports (id, account_id, protocol, provider, identifier, tokens, password)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PASSPORT_COLUMNS}
            "#
        ))
        .bind(Uuid::now_v7())
        .bind(input.account_id)
        .bind(input.protocol.as_str())
        .bind(&input.provider)
        .bind(&input.identifier)
        .bind(tokens)
        .bind(&input.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(map_constraint_error)?;

        Passport::try_from(row)
    }

    pub async fn get_local_passport(&self, account_id: Uuid) -> Result<Option<Passport>> {
        let row = sqlx::query_as::<_, PassportRow>(&format!(
            r#"
            SELECT {PASSPORT_COLUMNS}
            FROM passports
            WHERE account_id = $1 AND protocol = 'local'
            ORDER BY created_at ASC
            LIMIT 1
            "#
        ))
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Passport::try_from).transpose()
    }

    pub async fn get_passport_by_identity(
        &self,
        kind: AccountKind,
        provider: &str,
        identifier: &str,
    ) -> Result<Option<Passport>> {
        let row = sqlx::query_as::<_, PassportRow>(
            r#"
            SELECT p.id, p.account_id, p.protocol, p.provider, p.identifier, p.tokens, p.password,
                   p.created_at, p.updated_at
            FROM passports p
            JOIN accounts a ON a.id = p.account_id
            WHERE p.provider = $1 AND p.identifier = $2 AND a.kind = $3
            ORDER BY p.created_at ASC
            LIMIT 1
            "#,
        )
        .bind(provider)
        .bind(identifier)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Passport::try_from).transpose()
    }

    pub async fn get_account_passport(
        &self,
        account_id: Uuid,
        provider: &str,
    ) -> Result<Option<Passport>> {
        let row = sqlx::query_as::<_, PassportRow>(&format!(
            r#"
            SELECT {PASSPORT_COLUMNS}
            FROM passports
            WHERE account_id = $1 AND provider = $2
            ORDER BY created_at ASC
            LIMIT 1
            "#
        ))
        .bind(account_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Passport::try_from).transpose()
    }

    pub async fn list_passports(&self, account_id: Uuid) -> Result<Vec<Passport>> {
        let rows = sqlx::query_as::<_, PassportRow>(&format!(
            "SELECT {PASSPORT_COLUMNS} FROM passports WHERE account_id = $1 ORDER BY created_at ASC"
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Passport::try_from).collect()
    }

    pub async fn update_passport_tokens(
        &self,
        id: Uuid,
        tokens: Option<Tokens>,
    ) -> Result<Option<Passport>> {
        let tokens = tokens.map(serde_json::to_value).transpose()?;

        let row = sqlx::query_as::<_, PassportRow>(&format!(
            r#"
            UPDATE passports
            SET tokens = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {PASSPORT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(tokens)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Passport::try_from).transpose()
    }

    pub async fn delete_passport(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM passports WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
