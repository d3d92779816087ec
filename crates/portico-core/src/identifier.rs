// Local login identifier classification
// Decision: Accept the common RFC 5322 subset (dot-atom or quoted local part, dotted domain
// with an alphabetic TLD) instead of a full grammar

use regex::Regex;
use std::sync::LazyLock;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)^(?:[a-z0-9!#$%&'*+/=?^_`{|}~\u{00A0}-\u{FFEF}-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~\u{00A0}-\u{FFEF}-]+)*|"(?:[\x01-\x09\x0b\x0c\x0e-\x21\x23-\x5b\x5d-\x7f]|\\[\x01-\x09\x0b\x0c\x0d-\x7f])*")@(?:[a-z0-9\u{00A0}-\u{FFEF}](?:[a-z0-9\u{00A0}-\u{FFEF}_~-]*[a-z0-9\u{00A0}-\u{FFEF}])?\.)+[a-z\u{00A0}-\u{FFEF}](?:[a-z0-9\u{00A0}-\u{FFEF}_~-]*[a-z\u{00A0}-\u{FFEF}])?$"#,
    )
    .expect("email regex is valid")
});

/// Whether `s` looks like an email address.
pub fn is_email(s: &str) -> bool {
    EMAIL_REGEX.is_match(s)
}

/// A local login identifier, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Email(String),
    Username(String),
}

impl Identifier {
    pub fn classify(raw: &str) -> Self {
        if is_email(raw) {
            Identifier::Email(raw.to_string())
        } else {
            Identifier::Username(raw.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Identifier::Email(s) | Identifier::Username(s) => s,
        }
    }

    pub fn is_email(&self) -> bool {
        matches!(self, Identifier::Email(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_common_emails() {
        assert!(is_email("admin@portico.test"));
        assert!(is_email("new.admin@email.com"));
        assert!(is_email("first+tag@sub.example.co"));
        assert!(is_email("UPPER@EXAMPLE.COM"));
        assert!(is_email("\"quoted local\"@example.com"));
    }

    #[test]
    fn test_rejects_non_emails() {
        assert!(!is_email("jane"));
        assert!(!is_email("jane@"));
        assert!(!is_email("@example.com"));
        assert!(!is_email("jane@localhost"));
        assert!(!is_email("jane@example.c0m1"));
        assert!(!is_email("ja ne@example.com"));
        assert!(!is_email(""));
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            Identifier::classify("admin@portico.test"),
            Identifier::Email("admin@portico.test".to_string())
        );
        let username = Identifier::classify("jane_doe");
        assert!(!username.is_email());
        assert_eq!(username.as_str(), "jane_doe");
    }
}
