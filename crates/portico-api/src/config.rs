// Application configuration loaded from environment variables.
// Decision: AUTH_ prefix for everything authentication related
// Decision: No DATABASE_URL means in-memory storage (dev mode)

use portico_core::Protocol;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://localhost:9000";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:9000";

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        *self == Environment::Production
    }
}

/// Third-party provider configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    /// Provider name as it appears in `/auth/:provider`
    pub name: String,
    pub protocol: Protocol,
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    /// Fallback endpoint listing the user's emails (GitHub)
    pub emails_url: Option<String>,
    pub scope: Vec<String>,
    /// Callback path relative to the base URL and kind prefix
    pub callback: Option<String>,
}

impl ProviderConfig {
    /// Callback path, defaulting to `auth/<provider>/callback`
    pub fn callback_path(&self) -> String {
        self.callback
            .clone()
            .unwrap_or_else(|| format!("auth/{}/callback", self.name))
    }

    fn google(client_id: String, client_secret: String) -> Self {
        Self {
            name: "google".to_string(),
            protocol: Protocol::OAuth2,
            client_id,
            client_secret,
            authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            userinfo_url: "https://www.googleapis.com/oauth2/v3/userinfo".to_string(),
            emails_url: None,
            scope: vec![
                "openid".to_string(),
                "email".to_string(),
                "profile".to_string(),
            ],
            callback: None,
        }
    }

    fn github(client_id: String, client_secret: String) -> Self {
        Self {
            name: "github".to_string(),
            protocol: Protocol::OAuth2,
            client_id,
            client_secret,
            authorize_url: "https://github.com/login/oauth/authorize".to_string(),
            token_url: "https://github.com/login/oauth/access_token".to_string(),
            userinfo_url: "https://api.github.com/user".to_string(),
            emails_url: Some("https://api.github.com/user/emails".to_string()),
            scope: vec!["user:email".to_string(), "read:user".to_string()],
            callback: None,
        }
    }
}

/// Admin seeded at startup when both fields are set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSeedConfig {
    pub email: String,
    pub password: String,
}

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub bind_addr: String,
    /// PostgreSQL URL; `None` selects the in-memory backend
    pub database_url: Option<String>,
    /// Base URL for OAuth callbacks
    pub base_url: String,
    /// Whether the local (username/email + password) strategy is enabled
    pub local_enabled: bool,
    pub session_max_age: Duration,
    /// Mark the session cookie `Secure`
    pub cookie_secure: bool,
    pub admin: Option<AdminSeedConfig>,
    pub providers: Vec<ProviderConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            database_url: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            local_enabled: true,
            session_max_age: Duration::from_secs(24 * 60 * 60), // 1 day
            cookie_secure: false,
            admin: None,
            providers: Vec::new(),
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|s| s.to_lowercase() == "true" || s == "1")
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Minutes as a duration; absurdly large values saturate instead of overflowing.
fn parse_minutes(raw: &str) -> Option<Duration> {
    let mins: u64 = raw.trim().parse().ok()?;
    Some(Duration::from_secs(mins.saturating_mul(60)))
}

fn parse_scope(raw: &str) -> Vec<String> {
    raw.split([',', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let environment = std::env::var("APP_ENV")
            .map(|s| Environment::from_str(&s))
            .unwrap_or_default();

        let bind_addr = env_non_empty("BIND_ADDR").unwrap_or(defaults.bind_addr);
        let database_url = env_non_empty("DATABASE_URL");

        let base_url = env_non_empty("AUTH_BASE_URL")
            .or_else(|| env_non_empty("BASE_URL"))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let local_enabled = env_flag("AUTH_LOCAL_ENABLED").unwrap_or(true);

        let session_max_age = std::env::var("AUTH_SESSION_MAX_AGE")
            .ok()
            .and_then(|s| parse_minutes(&s))
            .unwrap_or(defaults.session_max_age);

        let cookie_secure =
            env_flag("AUTH_COOKIE_SECURE").unwrap_or_else(|| environment.is_production());

        let admin = match (
            env_non_empty("AUTH_ADMIN_EMAIL"),
            env_non_empty("AUTH_ADMIN_PASSWORD"),
        ) {
            (Some(email), Some(password)) => Some(AdminSeedConfig { email, password }),
            _ => None,
        };

        let mut providers = Vec::new();

        // Presets
        for (name, preset) in [
            ("GOOGLE", ProviderConfig::google as fn(String, String) -> ProviderConfig),
            ("GITHUB", ProviderConfig::github),
        ] {
            if let (Some(client_id), Some(client_secret)) = (
                env_non_empty(&format!("AUTH_{name}_CLIENT_ID")),
                env_non_empty(&format!("AUTH_{name}_CLIENT_SECRET")),
            ) {
                let mut provider = preset(client_id, client_secret);
                apply_overrides(&mut provider, name);
                providers.push(provider);
            }
        }

        // Generic providers: AUTH_PROVIDERS=okta,gitlab
        if let Some(list) = env_non_empty("AUTH_PROVIDERS") {
            for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let name = name.to_lowercase();
                if providers.iter().any(|p| p.name == name) {
                    continue;
                }
                match generic_provider_from_env(&name) {
                    Some(provider) => providers.push(provider),
                    None => tracing::warn!(
                        provider = %name,
                        "Provider listed in AUTH_PROVIDERS is missing configuration, skipping"
                    ),
                }
            }
        }

        Self {
            environment,
            bind_addr,
            database_url,
            base_url,
            local_enabled,
            session_max_age,
            cookie_secure,
            admin,
            providers,
        }
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }
}

fn apply_overrides(provider: &mut ProviderConfig, env_name: &str) {
    if let Some(scope) = env_non_empty(&format!("AUTH_{env_name}_SCOPE")) {
        provider.scope = parse_scope(&scope);
    }
    if let Some(callback) = env_non_empty(&format!("AUTH_{env_name}_CALLBACK")) {
        provider.callback = Some(callback);
    }
}

fn generic_provider_from_env(name: &str) -> Option<ProviderConfig> {
    let env_name = name.to_uppercase().replace('-', "_");
    let var = |suffix: &str| env_non_empty(&format!("AUTH_{env_name}_{suffix}"));

    let protocol = var("PROTOCOL")
        .and_then(|s| Protocol::from_str(&s))
        .unwrap_or(Protocol::OAuth2);

    let mut provider = ProviderConfig {
        name: name.to_string(),
        protocol,
        client_id: var("CLIENT_ID")?,
        client_secret: var("CLIENT_SECRET")?,
        authorize_url: var("AUTHORIZE_URL")?,
        token_url: var("TOKEN_URL")?,
        userinfo_url: var("USERINFO_URL")?,
        emails_url: var("EMAILS_URL"),
        scope: Vec::new(),
        callback: None,
    };
    apply_overrides(&mut provider, &env_name);
    Some(provider)
}
