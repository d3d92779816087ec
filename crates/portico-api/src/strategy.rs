// Third-party authentication strategies
// Decision: Manual authorization-code flow over reqwest, one generic strategy with presets
// Decision: OAuth 1.0a providers are not supported and are skipped at load time
//
// A strategy knows how to send the user to a provider and how to turn the
// provider's callback code into an identity. What happens to that identity
// (new account, refreshed tokens, connected passport) is decided by the
// passport service, not here.

use anyhow::{Context, Result};
use async_trait::async_trait;
use portico_core::{Profile, ProfileEmail, Protocol, Tokens};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

use crate::config::{AppConfig, ProviderConfig};

const USER_AGENT: &str = "Portico";

/// What a provider told us about the user after a successful exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderIdentity {
    pub identifier: Option<String>,
    pub profile: Profile,
    pub tokens: Tokens,
}

#[async_trait]
pub trait Strategy: Send + Sync {
    /// Provider name (`/auth/:provider`)
    fn name(&self) -> &str;

    fn protocol(&self) -> Protocol;

    /// Callback path relative to the base URL and account kind prefix
    fn callback_path(&self) -> String {
        format!("auth/{}/callback", self.name())
    }

    /// URL to redirect the user to for authorization
    fn authorization_url(&self, state: &str, redirect_uri: &str) -> Result<String>;

    /// Exchange the callback code for tokens and a profile
    async fn authenticate(&self, code: &str, redirect_uri: &str) -> Result<ProviderIdentity>;
}

/// Authorization-code flow shared by OAuth 2.0 and OpenID Connect providers
pub struct OAuth2Strategy {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl OAuth2Strategy {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn scope(&self) -> String {
        let mut scope = self.config.scope.clone();
        if self.config.protocol == Protocol::OpenId && !scope.iter().any(|s| s == "openid") {
            scope.insert(0, "openid".to_string());
        }
        scope.join(" ")
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<Tokens> {
        let response: Value = self
            .client
            .post(&self.config.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .context("Failed to exchange code")?
            .json()
            .await
            .context("Failed to parse token response")?;

        if let Some(error) = response.get("error").and_then(Value::as_str) {
            anyhow::bail!("Token endpoint returned {}", error);
        }

        let tokens: Tokens =
            serde_json::from_value(response).context("Malformed token response")?;
        if tokens.access_token.is_none() {
            anyhow::bail!("Token response carried no access_token");
        }
        Ok(tokens)
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T> {
        self.client
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .bearer_auth(access_token)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }
}

#[derive(Debug, Deserialize)]
struct ProviderEmailEntry {
    email: String,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    verified: bool,
}

#[async_trait]
impl Strategy for OAuth2Strategy {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn protocol(&self) -> Protocol {
        self.config.protocol
    }

    fn callback_path(&self) -> String {
        self.config.callback_path()
    }

    fn authorization_url(&self, state: &str, redirect_uri: &str) -> Result<String> {
        let url = Url::parse_with_params(
            &self.config.authorize_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", self.scope().as_str()),
                ("state", state),
            ],
        )
        .with_context(|| format!("Invalid authorize URL for {}", self.config.name))?;
        Ok(url.into())
    }

    async fn authenticate(&self, code: &str, redirect_uri: &str) -> Result<ProviderIdentity> {
        let tokens = self.exchange_code(code, redirect_uri).await?;
        let access_token = tokens.access_token.clone().unwrap_or_default();

        let userinfo: Value = self
            .fetch_json(&self.config.userinfo_url, &access_token)
            .await?;
        let (identifier, mut profile) =
            profile_from_userinfo(&self.config.name, self.config.protocol, &userinfo);

        // GitHub hides private emails from /user
        if profile.emails.is_empty() {
            if let Some(emails_url) = &self.config.emails_url {
                let entries: Vec<ProviderEmailEntry> =
                    self.fetch_json(emails_url, &access_token).await?;
                profile.emails = primary_first(entries);
            }
        }

        tracing::debug!(
            provider = %self.config.name,
            has_identifier = identifier.is_some(),
            emails = profile.emails.len(),
            "Provider profile loaded"
        );

        Ok(ProviderIdentity {
            identifier,
            profile,
            tokens,
        })
    }
}

fn primary_first(mut entries: Vec<ProviderEmailEntry>) -> Vec<ProfileEmail> {
    entries.sort_by_key(|e| !e.primary);
    entries
        .into_iter()
        .map(|e| ProfileEmail {
            value: e.email,
            verified: e.verified,
        })
        .collect()
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Map a userinfo document onto the provider identifier and a profile.
///
/// OpenID providers are identified by `sub`; OAuth 2.0 providers by `id`,
/// falling back to `sub`.
pub fn profile_from_userinfo(
    provider: &str,
    protocol: Protocol,
    userinfo: &Value,
) -> (Option<String>, Profile) {
    let identifier = match protocol {
        Protocol::OpenId => string_field(userinfo, "sub"),
        _ => string_field(userinfo, "id").or_else(|| string_field(userinfo, "sub")),
    };

    let username = ["login", "preferred_username", "username"]
        .iter()
        .find_map(|key| string_field(userinfo, key));

    let emails = string_field(userinfo, "email")
        .map(|email| {
            vec![ProfileEmail {
                value: email,
                verified: userinfo
                    .get("email_verified")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            }]
        })
        .unwrap_or_default();

    let profile = Profile {
        provider: Some(provider.to_string()),
        username,
        display_name: string_field(userinfo, "name"),
        emails,
    };

    (identifier, profile)
}

/// Strategies available to the passport service
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    local_enabled: bool,
    strategies: HashMap<String, Arc<dyn Strategy>>,
}

impl StrategyRegistry {
    /// Build the registry from configuration.
    pub fn load_strategies(config: &AppConfig) -> Self {
        let mut registry = Self {
            local_enabled: config.local_enabled,
            strategies: HashMap::new(),
        };

        for provider in &config.providers {
            match provider.protocol {
                Protocol::OAuth2 | Protocol::OpenId => {
                    registry = registry.with_strategy(Arc::new(OAuth2Strategy::new(provider.clone())));
                }
                Protocol::OAuth => tracing::warn!(
                    provider = %provider.name,
                    "OAuth 1.0a providers are not supported, skipping"
                ),
                Protocol::Local => tracing::warn!(
                    provider = %provider.name,
                    "Local strategy is built in and cannot be configured as a provider, skipping"
                ),
            }
        }

        tracing::info!(
            local = registry.local_enabled,
            providers = ?registry.providers(),
            "Authentication strategies loaded"
        );
        registry
    }

    pub fn with_local(mut self, enabled: bool) -> Self {
        self.local_enabled = enabled;
        self
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn Strategy>) -> Self {
        self.strategies.insert(strategy.name().to_string(), strategy);
        self
    }

    pub fn local_enabled(&self) -> bool {
        self.local_enabled
    }

    pub fn get(&self, provider: &str) -> Option<Arc<dyn Strategy>> {
        self.strategies.get(provider).cloned()
    }

    /// Configured third-party provider names, sorted
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<_> = self.strategies.keys().cloned().collect();
        names.sort();
        names
    }
}
