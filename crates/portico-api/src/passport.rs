// Passport service: strategy dispatch and account/passport reconciliation
// Decision: One service per app, parameterized by account kind on every call
// Decision: Account creation failures are annotated with a flash key for the UI
//
// Reconciling a third-party login considers two facts: whether the request
// already has a logged-in account, and whether a passport for the
// (provider, identifier) pair exists.
//
//   session | passport | result
//   --------+----------+--------------------------------------------
//   no      | no       | create account from profile, link passport
//   no      | yes      | refresh tokens, log in the linked account
//   yes     | no       | link a new passport to the session account
//   yes     | yes      | nothing to do, keep the session account

use portico_core::{
    Account, AccountKind, Attribute, FlashMessage, NewAccount, NewPassport, Passport,
    PassportError, PassportQuery, Profile, Result,
};
use portico_storage::StorageBackend;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::protocols::{LocalProtocol, LoginOutcome, RegisterRequest};
use crate::state::kind_prefix;
use crate::strategy::{Strategy, StrategyRegistry};

pub const LOCAL_PROVIDER: &str = "local";

/// Generate a random state string for OAuth (32 hex characters)
fn generate_oauth_state() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Resolve a strategy callback path against the base URL, under the
/// account kind's route prefix. Absolute URLs are returned untouched.
pub fn resolve_callback(base_url: &str, kind: AccountKind, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}{}/{}",
        base_url.trim_end_matches('/'),
        kind_prefix(kind),
        path.trim_start_matches('/')
    )
}

/// Provider authorization redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub url: String,
    pub state: String,
}

/// Fields accepted by the callback endpoints: local form fields in the
/// body, provider parameters in the query string.
#[derive(Clone, Default, Deserialize, Serialize, ToSchema, IntoParams)]
pub struct CallbackParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default, skip_serializing)]
    pub code: Option<String>,
    #[serde(default, skip_serializing)]
    pub state: Option<String>,
    #[serde(default, skip_serializing)]
    pub error: Option<String>,
}

impl std::fmt::Debug for CallbackParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackParams")
            .field("identifier", &self.identifier)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("has_password", &self.password.is_some())
            .field("has_code", &self.code.is_some())
            .field("error", &self.error)
            .finish()
    }
}

impl CallbackParams {
    /// Form fields safe to flash back to the UI (no secrets).
    pub fn form(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Layer query parameters under the body; body fields win.
    pub fn merge(self, other: CallbackParams) -> Self {
        Self {
            identifier: self.identifier.or(other.identifier),
            username: self.username.or(other.username),
            email: self.email.or(other.email),
            password: self.password.or(other.password),
            code: self.code.or(other.code),
            state: self.state.or(other.state),
            error: self.error.or(other.error),
        }
    }
}

/// Everything the callback needs from the request
#[derive(Debug, Clone)]
pub struct CallbackRequest {
    pub provider: String,
    pub action: Option<String>,
    pub session_account: Option<Account>,
    pub params: CallbackParams,
    /// OAuth state stored in the session by `endpoint`
    pub expected_state: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    /// Log this account in; `passport_id` is the passport used, when known
    LoggedIn {
        account: Account,
        passport_id: Option<Uuid>,
    },
    /// Credentials rejected; show this flash message
    Rejected(FlashMessage),
}

#[derive(Clone)]
pub struct PassportService {
    storage: StorageBackend,
    local: LocalProtocol,
    strategies: StrategyRegistry,
    base_url: String,
}

impl PassportService {
    pub fn new(storage: StorageBackend, strategies: StrategyRegistry, base_url: String) -> Self {
        Self {
            local: LocalProtocol::new(storage.clone()),
            storage,
            strategies,
            base_url,
        }
    }

    pub fn local(&self) -> &LocalProtocol {
        &self.local
    }

    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    fn callback_url(&self, kind: AccountKind, strategy: &dyn Strategy) -> String {
        resolve_callback(&self.base_url, kind, &strategy.callback_path())
    }

    /// Reconcile a third-party identity with the session account.
    pub async fn connect(
        &self,
        kind: AccountKind,
        session_account: Option<Account>,
        query: PassportQuery,
        profile: Profile,
    ) -> Result<(Account, Passport)> {
        let provider = profile
            .provider
            .clone()
            .or_else(|| query.provider.clone())
            .ok_or(PassportError::NoProvider)?;

        let email = profile.primary_email().map(str::to_string);
        let username = profile.username.clone();
        if email.is_none() && username.is_none() {
            return Err(PassportError::NoIdentity);
        }

        let identifier = query
            .identifier
            .clone()
            .ok_or(PassportError::MissingIdentifier)?;

        let existing = self
            .storage
            .get_passport_by_identity(kind, &provider, &identifier)
            .await
            .map_err(PassportError::storage)?;

        match (session_account, existing) {
            (None, None) => {
                let account = self
                    .storage
                    .create_account(kind, NewAccount { username, email })
                    .await
                    .map_err(account_creation_error)?;

                let passport = match self
                    .storage
                    .create_passport(NewPassport::from_query(account.id, &query, &provider))
                    .await
                {
                    Ok(passport) => passport,
                    Err(err) => {
                        if let Err(destroy_err) =
                            self.storage.delete_account(kind, account.id).await
                        {
                            tracing::error!(
                                account_id = %account.id,
                                error = %destroy_err,
                                "Failed to remove account after passport failure"
                            );
                        }
                        return Err(PassportError::storage(err));
                    }
                };

                tracing::info!(
                    kind = %kind,
                    provider = %provider,
                    account_id = %account.id,
                    "Account created from provider profile"
                );
                Ok((account, passport))
            }
            (None, Some(passport)) => {
                let passport = if query.tokens.is_some() && query.tokens != passport.tokens {
                    self.storage
                        .update_passport_tokens(passport.id, query.tokens.clone())
                        .await
                        .map_err(PassportError::storage)?
                        .unwrap_or(passport)
                } else {
                    passport
                };

                let account = self
                    .storage
                    .get_account(kind, passport.account_id)
                    .await
                    .map_err(PassportError::storage)?
                    .ok_or_else(|| {
                        PassportError::Internal(anyhow::anyhow!(
                            "Passport {} refers to a missing account",
                            passport.id
                        ))
                    })?;

                tracing::debug!(provider = %provider, account_id = %account.id, "Provider login");
                Ok((account, passport))
            }
            (Some(account), None) => {
                let passport = self
                    .storage
                    .create_passport(NewPassport::from_query(account.id, &query, &provider))
                    .await
                    .map_err(PassportError::storage)?;

                tracing::info!(
                    provider = %provider,
                    account_id = %account.id,
                    "Provider connected to account"
                );
                Ok((account, passport))
            }
            (Some(account), Some(passport)) => {
                if passport.account_id != account.id {
                    tracing::warn!(
                        provider = %provider,
                        account_id = %account.id,
                        "Provider identity already linked to another account"
                    );
                }
                Ok((account, passport))
            }
        }
    }

    /// Build the provider redirect. `None` when the provider is unknown.
    pub fn endpoint(&self, kind: AccountKind, provider: &str) -> Result<Option<Authorization>> {
        let Some(strategy) = self.strategies.get(provider) else {
            tracing::debug!(provider = %provider, "Unknown provider requested");
            return Ok(None);
        };

        let state = generate_oauth_state();
        let redirect_uri = self.callback_url(kind, strategy.as_ref());
        let url = strategy.authorization_url(&state, &redirect_uri)?;

        Ok(Some(Authorization { url, state }))
    }

    /// Handle a callback from a provider or a local form post.
    pub async fn callback(
        &self,
        kind: AccountKind,
        request: CallbackRequest,
    ) -> Result<CallbackOutcome> {
        let CallbackRequest {
            provider,
            action,
            session_account,
            params,
            expected_state,
        } = request;

        if provider == LOCAL_PROVIDER {
            if !self.strategies.local_enabled() {
                return Err(PassportError::UnknownProvider(provider));
            }
            return self
                .local_callback(kind, action.as_deref(), session_account, params)
                .await;
        }

        if let (Some("disconnect"), Some(account)) = (action.as_deref(), session_account.clone())
        {
            let account = self.disconnect(account, &provider).await?;
            return Ok(CallbackOutcome::LoggedIn {
                account,
                passport_id: None,
            });
        }

        let strategy = self
            .strategies
            .get(&provider)
            .ok_or_else(|| PassportError::UnknownProvider(provider.clone()))?;

        if let Some(error) = params.error {
            return Err(PassportError::strategy(error));
        }

        match (expected_state.as_deref(), params.state.as_deref()) {
            (Some(expected), Some(received)) if expected == received => {}
            _ => return Err(PassportError::InvalidState),
        }

        let code = params
            .code
            .ok_or_else(|| PassportError::strategy("Missing authorization code"))?;

        let redirect_uri = self.callback_url(kind, strategy.as_ref());
        let identity = strategy
            .authenticate(&code, &redirect_uri)
            .await
            .map_err(|e| PassportError::strategy(format!("{:#}", e)))?;

        let query = PassportQuery {
            protocol: strategy.protocol(),
            provider: Some(provider),
            identifier: identity.identifier,
            tokens: Some(identity.tokens),
        };

        let (account, passport) = self
            .connect(kind, session_account, query, identity.profile)
            .await?;

        // A passport already linked to another account stays out of this session
        let passport_id = (passport.account_id == account.id).then_some(passport.id);
        Ok(CallbackOutcome::LoggedIn {
            account,
            passport_id,
        })
    }

    async fn local_callback(
        &self,
        kind: AccountKind,
        action: Option<&str>,
        session_account: Option<Account>,
        params: CallbackParams,
    ) -> Result<CallbackOutcome> {
        match (action, session_account) {
            (Some("register"), None) => {
                let account = self
                    .local
                    .register(
                        kind,
                        RegisterRequest {
                            username: params.username,
                            email: params.email,
                            password: params.password,
                        },
                    )
                    .await?;
                let passport_id = self
                    .storage
                    .get_local_passport(account.id)
                    .await
                    .map_err(PassportError::storage)?
                    .map(|p| p.id);
                Ok(CallbackOutcome::LoggedIn {
                    account,
                    passport_id,
                })
            }
            (Some("connect"), Some(account)) => {
                let account = self.local.connect(account, params.password).await?;
                Ok(CallbackOutcome::LoggedIn {
                    account,
                    passport_id: None,
                })
            }
            (Some("disconnect"), Some(account)) => {
                let account = self.local.disconnect(account).await?;
                Ok(CallbackOutcome::LoggedIn {
                    account,
                    passport_id: None,
                })
            }
            (None | Some("login"), _) => {
                let identifier = params.identifier.or(params.email).or(params.username);
                let (Some(identifier), Some(password)) = (identifier, params.password) else {
                    return Ok(CallbackOutcome::Rejected(FlashMessage::Generic));
                };

                match self.local.login(kind, &identifier, &password).await? {
                    LoginOutcome::Authenticated { account, passport } => {
                        Ok(CallbackOutcome::LoggedIn {
                            account,
                            passport_id: Some(passport.id),
                        })
                    }
                    LoginOutcome::Rejected(flash) => Ok(CallbackOutcome::Rejected(flash)),
                }
            }
            _ => Err(PassportError::InvalidAction),
        }
    }

    /// Remove the account's passport for `provider`.
    pub async fn disconnect(&self, account: Account, provider: &str) -> Result<Account> {
        let passport = self
            .storage
            .get_account_passport(account.id, provider)
            .await
            .map_err(PassportError::storage)?
            .ok_or_else(|| PassportError::NotConnected(provider.to_string()))?;

        self.storage
            .delete_passport(passport.id)
            .await
            .map_err(PassportError::storage)?;
        tracing::info!(provider = %provider, account_id = %account.id, "Provider disconnected");

        Ok(account)
    }

    /// Reload the account a session points at. A principal whose account is
    /// gone deserializes to `None`.
    pub async fn deserialize(&self, kind: AccountKind, account_id: Uuid) -> Result<Option<Account>> {
        self.storage
            .get_account(kind, account_id)
            .await
            .map_err(PassportError::storage)
    }
}

fn account_creation_error(err: anyhow::Error) -> PassportError {
    match PassportError::storage(err) {
        PassportError::Validation { source, .. } => {
            let flash = if source.has(Attribute::Email) {
                FlashMessage::EmailExists
            } else {
                FlashMessage::UserExists
            };
            PassportError::Validation {
                source,
                flash: Some(flash),
            }
        }
        other => other,
    }
}
