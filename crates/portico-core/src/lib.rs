// Portico core
// Decision: Keep domain types storage-agnostic; storage and API crates depend on this one
//
// - account: AccountKind, Account and its public view (gravatar, no password)
// - passport: Protocol, Passport, Tokens and third-party Profile
// - identifier: email-vs-username classification for local login
// - flash: flash message keys surfaced to the UI
// - error: PassportError and ValidationError

pub mod account;
pub mod error;
pub mod flash;
pub mod identifier;
pub mod passport;
pub mod telemetry;

pub use account::{gravatar_url, Account, AccountKind, AccountView, NewAccount};
pub use error::{Attribute, PassportError, Result, ValidationError};
pub use flash::FlashMessage;
pub use identifier::{is_email, Identifier};
pub use passport::{
    NewPassport, Passport, PassportQuery, PassportView, Profile, ProfileEmail, Protocol, Tokens,
};
