//! Vietnamese phone number type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Phone`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    /// The input string is empty.
    #[error("phone number cannot be empty")]
    Empty,
    /// The input contains something other than digits and separators.
    #[error("phone number may only contain digits, spaces, dots and dashes")]
    InvalidCharacters,
    /// Wrong number of digits.
    #[error("phone number must have 10 digits")]
    InvalidLength,
    /// Not a mobile prefix.
    #[error("phone number must start with 03, 05, 07, 08 or 09")]
    InvalidPrefix,
}

/// A Vietnamese mobile number in national format (`0912345678`).
///
/// Accepts common ways customers type their number: with spaces, dots or
/// dashes, and with the `+84`/`84` country prefix.
///
/// ```
/// use nutmart_core::Phone;
///
/// assert_eq!(Phone::parse("+84 912 345 678").unwrap().as_str(), "0912345678");
/// assert_eq!(Phone::parse("0912.345.678").unwrap().as_str(), "0912345678");
/// assert!(Phone::parse("0212345678").is_err()); // landline prefix
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Phone(String);

impl Phone {
    /// Parse and normalize a phone number.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, contains letters, does not
    /// have 10 digits after normalization, or is not a mobile prefix.
    pub fn parse(s: &str) -> Result<Self, PhoneError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PhoneError::Empty);
        }

        let (has_plus, rest) = s.strip_prefix('+').map_or((false, s), |r| (true, r));

        let mut digits = String::with_capacity(rest.len());
        for c in rest.chars() {
            match c {
                '0'..='9' => digits.push(c),
                ' ' | '.' | '-' => {}
                _ => return Err(PhoneError::InvalidCharacters),
            }
        }

        let national = if let Some(subscriber) = digits.strip_prefix("84") {
            if has_plus || digits.len() == 11 {
                format!("0{subscriber}")
            } else {
                digits
            }
        } else if has_plus {
            return Err(PhoneError::InvalidPrefix);
        } else {
            digits
        };

        if national.len() != 10 {
            return Err(PhoneError::InvalidLength);
        }

        let mut chars = national.chars();
        match (chars.next(), chars.next()) {
            (Some('0'), Some('3' | '5' | '7' | '8' | '9')) => Ok(Self(national)),
            _ => Err(PhoneError::InvalidPrefix),
        }
    }

    /// Returns the number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `Phone` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Phone {
    type Err = PhoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
