//! Email addresses for logins and order contacts.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Why an address was rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    #[error("email cannot be empty")]
    Empty,
    #[error("email must be at most {} characters", Email::MAX_LENGTH)]
    TooLong,
    #[error("email must have the form name@domain")]
    Malformed,
    #[error("email must not contain spaces")]
    Whitespace,
    #[error("email domain '{0}' is not valid")]
    InvalidDomain(String),
}

/// A lowercased email address.
///
/// Accounts are looked up by email, so parsing trims and lowercases:
/// `" Mai@HatDieu.vn "` and `"mai@hatdieu.vn"` are the same customer. The
/// domain needs at least one dot and no empty labels, which catches the
/// usual checkout typos (`mai@gmail`, `mai@gmail..com`).
///
/// ```
/// use nutmart_core::Email;
///
/// assert_eq!(Email::parse(" Mai@HatDieu.vn ").unwrap().as_str(), "mai@hatdieu.vn");
/// assert!(Email::parse("mai@gmail").is_err());
/// assert!(Email::parse("mai hoa@gmail.com").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(transparent))]
pub struct Email(String);

impl Email {
    /// RFC 5321 path limit.
    pub const MAX_LENGTH: usize = 254;

    /// Parse and normalize an address.
    ///
    /// # Errors
    ///
    /// Returns `EmailError` for empty, overlong or malformed input.
    pub fn parse(s: &str) -> Result<Self, EmailError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(EmailError::Empty);
        }
        if s.len() > Self::MAX_LENGTH {
            return Err(EmailError::TooLong);
        }
        if s.chars().any(char::is_whitespace) {
            return Err(EmailError::Whitespace);
        }

        let (local, domain) = s.split_once('@').ok_or(EmailError::Malformed)?;
        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return Err(EmailError::Malformed);
        }
        if !domain.contains('.') || domain.split('.').any(str::is_empty) {
            return Err(EmailError::InvalidDomain(domain.to_owned()));
        }

        Ok(Self(s.to_lowercase()))
    }

    /// The address as stored.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Email {
    type Error = EmailError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_common_addresses() {
        for s in [
            "khach@hatdieu.vn",
            "nguyen.van.an+donhang@gmail.com",
            "sale01@cty.com.vn",
        ] {
            assert!(Email::parse(s).is_ok(), "{s}");
        }
    }

    #[test]
    fn test_normalizes_case_and_whitespace() {
        let email = Email::parse("  Khach.Hang@Gmail.COM ").unwrap();
        assert_eq!(email.as_str(), "khach.hang@gmail.com");
        assert_eq!(email.to_string(), "khach.hang@gmail.com");
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!(Email::parse("   "), Err(EmailError::Empty));
        assert_eq!(Email::parse("khach.hatdieu.vn"), Err(EmailError::Malformed));
        assert_eq!(Email::parse("@hatdieu.vn"), Err(EmailError::Malformed));
        assert_eq!(Email::parse("khach@"), Err(EmailError::Malformed));
        assert_eq!(Email::parse("a@b@hatdieu.vn"), Err(EmailError::Malformed));
        assert_eq!(Email::parse("an na@hatdieu.vn"), Err(EmailError::Whitespace));
    }

    #[test]
    fn test_rejects_typo_domains() {
        assert!(matches!(
            Email::parse("mai@gmail"),
            Err(EmailError::InvalidDomain(d)) if d == "gmail"
        ));
        assert!(Email::parse("mai@gmail..com").is_err());
        assert!(Email::parse("mai@.gmail.com").is_err());
    }

    #[test]
    fn test_rejects_overlong() {
        let long = format!("{}@hatdieu.vn", "a".repeat(250));
        assert_eq!(Email::parse(&long), Err(EmailError::TooLong));
    }

    #[test]
    fn test_deserialize_validates() {
        let email: Email = serde_json::from_str("\"Mai@HatDieu.vn\"").unwrap();
        assert_eq!(email.as_str(), "mai@hatdieu.vn");
        assert_eq!(serde_json::to_string(&email).unwrap(), "\"mai@hatdieu.vn\"");

        assert!(serde_json::from_str::<Email>("\"not an email\"").is_err());
    }
}
