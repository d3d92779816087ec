// Shared application state
// Decision: One AppState for the app; kind-scoped routers wrap it with their AccountKind

use portico_core::{Account, AccountKind, PassportError};
use portico_storage::StorageBackend;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::passport::PassportService;
use crate::protocols::RegisterRequest;
use crate::session::SessionStore;
use crate::strategy::StrategyRegistry;

/// Route prefix of an account kind's namespace
pub fn kind_prefix(kind: AccountKind) -> &'static str {
    match kind {
        AccountKind::Employee => "",
        AccountKind::Admin => "/admin",
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: StorageBackend,
    pub sessions: SessionStore,
    pub passport: PassportService,
}

impl AppState {
    /// Build state with strategies loaded from the configuration.
    pub fn new(config: AppConfig, storage: StorageBackend) -> Self {
        let strategies = StrategyRegistry::load_strategies(&config);
        Self::with_strategies(config, storage, strategies)
    }

    pub fn with_strategies(
        config: AppConfig,
        storage: StorageBackend,
        strategies: StrategyRegistry,
    ) -> Self {
        let sessions = SessionStore::new(config.session_max_age, config.cookie_secure);
        let passport = PassportService::new(storage.clone(), strategies, config.base_url.clone());
        Self {
            config: Arc::new(config),
            storage,
            sessions,
            passport,
        }
    }

    /// Create the configured admin unless an admin with that email exists.
    pub async fn seed_admin(&self) -> portico_core::Result<Option<Account>> {
        let Some(seed) = &self.config.admin else {
            return Ok(None);
        };

        let existing = self
            .storage
            .get_account_by_email(AccountKind::Admin, &seed.email)
            .await
            .map_err(PassportError::storage)?;
        if existing.is_some() {
            tracing::debug!(email = %seed.email, "Seed admin already exists");
            return Ok(None);
        }

        let account = self
            .passport
            .local()
            .register(
                AccountKind::Admin,
                RegisterRequest {
                    username: None,
                    email: Some(seed.email.clone()),
                    password: Some(seed.password.clone()),
                },
            )
            .await?;
        tracing::info!(account_id = %account.id, email = %seed.email, "Seed admin created");
        Ok(Some(account))
    }
}

/// State of a router mounted for one account kind
#[derive(Clone)]
pub struct KindState {
    pub app: AppState,
    pub kind: AccountKind,
}

impl KindState {
    pub fn new(app: AppState, kind: AccountKind) -> Self {
        Self { app, kind }
    }

    pub fn prefix(&self) -> &'static str {
        kind_prefix(self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdminSeedConfig;

    #[test]
    fn test_kind_prefix() {
        assert_eq!(kind_prefix(AccountKind::Employee), "");
        assert_eq!(kind_prefix(AccountKind::Admin), "/admin");
    }

    #[tokio::test]
    async fn test_seed_admin_once() {
        let config = AppConfig {
            admin: Some(AdminSeedConfig {
                email: "admin@portico.test".to_string(),
                password: "admin1234".to_string(),
            }),
            ..Default::default()
        };
        let state = AppState::new(config, StorageBackend::in_memory());

        let created = state.seed_admin().await.unwrap();
        assert_eq!(
            created.map(|a| a.username),
            Some("admin@portico.test".to_string())
        );
        assert!(state.seed_admin().await.unwrap().is_none());
    }
}
