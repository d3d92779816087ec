// Flash message keys
//
// Authentication failures are reported to the UI through these keys rather
// than through error text. The views translate them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlashMessage {
    #[serde(rename = "Error.Passport.Email.NotFound")]
    EmailNotFound,
    #[serde(rename = "Error.Passport.Username.NotFound")]
    UsernameNotFound,
    #[serde(rename = "Error.Passport.Password.Wrong")]
    PasswordWrong,
    #[serde(rename = "Error.Passport.Password.NotSet")]
    PasswordNotSet,
    #[serde(rename = "Error.Passport.Email.Exists")]
    EmailExists,
    #[serde(rename = "Error.Passport.User.Exists")]
    UserExists,
    #[serde(rename = "Error.Passport.Generic")]
    Generic,
}

impl FlashMessage {
    pub fn key(&self) -> &'static str {
        match self {
            FlashMessage::EmailNotFound => "Error.Passport.Email.NotFound",
            FlashMessage::UsernameNotFound => "Error.Passport.Username.NotFound",
            FlashMessage::PasswordWrong => "Error.Passport.Password.Wrong",
            FlashMessage::PasswordNotSet => "Error.Passport.Password.NotSet",
            FlashMessage::EmailExists => "Error.Passport.Email.Exists",
            FlashMessage::UserExists => "Error.Passport.User.Exists",
            FlashMessage::Generic => "Error.Passport.Generic",
        }
    }
}

impl std::fmt::Display for FlashMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}
