// Portico HTTP service
// Decision: Library + thin binary so routers can be exercised in tests without a socket
//
// - config: environment configuration (AUTH_ prefix)
// - session: server-side sessions and the cookie middleware
// - strategy: third-party provider strategies (OAuth 2.0 / OpenID Connect)
// - protocols: the local username/email + password protocol
// - passport: strategy dispatch and account/passport reconciliation
// - policies: basic auth and session auth middleware
// - controllers, routes: HTTP surface for admins and employees

pub mod config;
pub mod controllers;
pub mod error;
pub mod extract;
pub mod passport;
pub mod policies;
pub mod protocols;
pub mod routes;
pub mod session;
pub mod state;
pub mod strategy;

pub use config::AppConfig;
pub use error::ApiError;
pub use routes::{build_app, ApiDoc};
pub use state::{AppState, KindState};
