// Authentication protocols
// Decision: Only the local protocol lives here; third-party flows go through strategies

pub mod local;

pub use local::{LocalProtocol, LoginOutcome, RegisterRequest};
