// Request policies
// Decision: Plain axum middleware functions, attached per route with route_layer
//
// - basic_auth: HTTP Basic credentials checked against local passports
// - session_auth: requires an authenticated session

pub mod basic_auth;
pub mod session_auth;

pub use basic_auth::basic_auth;
pub use session_auth::session_auth;
