// Local protocol: username/email + password
// Decision: Credential mismatches are outcomes, not errors; only storage failures are errors
// Decision: Registration compensates a failed passport by deleting the new account

use portico_core::{
    Account, AccountKind, FlashMessage, Identifier, NewAccount, NewPassport, Passport,
    PassportError, Result,
};
use portico_storage::{validate_password, StorageBackend};
use serde::Deserialize;
use utoipa::ToSchema;

/// Registration payload. The password never reaches the account record;
/// it is split off and stored on the local passport.
#[derive(Clone, Default, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Result of a local login attempt
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    Authenticated { account: Account, passport: Passport },
    Rejected(FlashMessage),
}

#[derive(Clone)]
pub struct LocalProtocol {
    storage: StorageBackend,
}

impl LocalProtocol {
    pub fn new(storage: StorageBackend) -> Self {
        Self { storage }
    }

    /// Register a new account with a local password.
    pub async fn register(&self, kind: AccountKind, request: RegisterRequest) -> Result<Account> {
        self.create_account(kind, request).await
    }

    /// Create the account, then its local passport. If the passport cannot
    /// be created the account is deleted again.
    pub async fn create_account(
        &self,
        kind: AccountKind,
        request: RegisterRequest,
    ) -> Result<Account> {
        let RegisterRequest {
            username,
            email,
            password,
        } = request;

        let account = self
            .storage
            .create_account(kind, NewAccount { username, email })
            .await
            .map_err(PassportError::storage)?;

        if let Err(err) = self
            .storage
            .create_passport(NewPassport::local(account.id, password))
            .await
        {
            tracing::warn!(
                kind = %kind,
                account_id = %account.id,
                error = %err,
                "Local passport creation failed, removing account"
            );
            if let Err(destroy_err) = self.storage.delete_account(kind, account.id).await {
                tracing::error!(
                    kind = %kind,
                    account_id = %account.id,
                    error = %destroy_err,
                    "Failed to remove account after passport failure, account may be orphaned"
                );
                return Err(PassportError::storage(destroy_err));
            }
            return Err(PassportError::storage(err));
        }

        tracing::info!(kind = %kind, account_id = %account.id, "Account registered");
        Ok(account)
    }

    /// Check a login identifier (email or username) and password.
    pub async fn login(
        &self,
        kind: AccountKind,
        identifier: &str,
        password: &str,
    ) -> Result<LoginOutcome> {
        let identifier = Identifier::classify(identifier);

        let account = match &identifier {
            Identifier::Email(email) => self.storage.get_account_by_email(kind, email).await,
            Identifier::Username(username) => {
                self.storage.get_account_by_username(kind, username).await
            }
        }
        .map_err(PassportError::storage)?;

        let Some(account) = account else {
            tracing::debug!(kind = %kind, by_email = identifier.is_email(), "Login for unknown account");
            return Ok(LoginOutcome::Rejected(if identifier.is_email() {
                FlashMessage::EmailNotFound
            } else {
                FlashMessage::UsernameNotFound
            }));
        };

        let Some(passport) = self
            .storage
            .get_local_passport(account.id)
            .await
            .map_err(PassportError::storage)?
        else {
            return Ok(LoginOutcome::Rejected(FlashMessage::PasswordNotSet));
        };

        if !validate_password(&passport, password)? {
            tracing::debug!(kind = %kind, account_id = %account.id, "Wrong password");
            return Ok(LoginOutcome::Rejected(FlashMessage::PasswordWrong));
        }

        Ok(LoginOutcome::Authenticated { account, passport })
    }

    /// Attach a local password to an already authenticated account. No-op
    /// when the account already has one.
    pub async fn connect(&self, account: Account, password: Option<String>) -> Result<Account> {
        let existing = self
            .storage
            .get_local_passport(account.id)
            .await
            .map_err(PassportError::storage)?;

        if existing.is_none() {
            self.storage
                .create_passport(NewPassport::local(account.id, password))
                .await
                .map_err(PassportError::storage)?;
            tracing::info!(account_id = %account.id, "Local passport connected");
        }

        Ok(account)
    }

    /// Remove the account's local password.
    pub async fn disconnect(&self, account: Account) -> Result<Account> {
        let passport = self
            .storage
            .get_local_passport(account.id)
            .await
            .map_err(PassportError::storage)?
            .ok_or_else(|| PassportError::NotConnected("local".to_string()))?;

        self.storage
            .delete_passport(passport.id)
            .await
            .map_err(PassportError::storage)?;
        tracing::info!(account_id = %account.id, "Local passport disconnected");

        Ok(account)
    }
}
