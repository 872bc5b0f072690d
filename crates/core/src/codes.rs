//! Human-facing codes: referral codes, voucher codes and order codes.
//!
//! Codes are read aloud over the phone and typed from printed cards, so the
//! generator avoids characters that are easy to confuse (`0 O 1 I L`).

use core::fmt;

use chrono::NaiveDate;
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

/// Characters used in generated codes.
const ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Length of generated referral codes.
pub const REFERRAL_CODE_LENGTH: usize = 8;

/// Length of the random part of voucher codes.
pub const VOUCHER_CODE_LENGTH: usize = 10;

/// Length of the random suffix of order codes.
const ORDER_SUFFIX_LENGTH: usize = 5;

/// Generate a random code of `len` characters.
#[must_use]
pub fn generate_code<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .filter_map(|_| ALPHABET.choose(rng).copied().map(char::from))
        .collect()
}

/// Generate a voucher code, e.g. `VC-7KX2MPQ9RT`.
#[must_use]
pub fn voucher_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("VC-{}", generate_code(rng, VOUCHER_CODE_LENGTH))
}

/// Generate an order code for an order placed on `date`, e.g. `NM241019-X7K2P`.
#[must_use]
pub fn order_code<R: Rng + ?Sized>(rng: &mut R, date: NaiveDate) -> String {
    format!(
        "NM{}-{}",
        date.format("%y%m%d"),
        generate_code(rng, ORDER_SUFFIX_LENGTH)
    )
}

/// Errors that can occur when parsing a [`ReferralCode`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferralCodeError {
    /// Fewer than 4 or more than 16 characters.
    #[error("referral code must be between 4 and 16 characters")]
    InvalidLength,
    /// Something other than letters and digits.
    #[error("referral code may only contain letters and digits")]
    InvalidCharacters,
}

/// A sale agent's referral code.
///
/// Generated codes use [`REFERRAL_CODE_LENGTH`] characters from the
/// unambiguous alphabet; admins may also assign vanity codes such as
/// `HATDIEU2024`. Parsing trims and uppercases, so customers can type codes
/// in any case.
///
/// ```
/// use nutmart_core::ReferralCode;
///
/// assert_eq!(ReferralCode::parse(" hatdieu24 ").unwrap().as_str(), "HATDIEU24");
/// assert!(ReferralCode::parse("ab").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ReferralCode(String);

impl ReferralCode {
    /// Minimum accepted length.
    pub const MIN_LENGTH: usize = 4;
    /// Maximum accepted length.
    pub const MAX_LENGTH: usize = 16;

    /// Parse a referral code as typed by a customer.
    ///
    /// # Errors
    ///
    /// Returns an error if the code has the wrong length or contains
    /// anything other than ASCII letters and digits.
    pub fn parse(s: &str) -> Result<Self, ReferralCodeError> {
        let s = s.trim();
        if !(Self::MIN_LENGTH..=Self::MAX_LENGTH).contains(&s.len()) {
            return Err(ReferralCodeError::InvalidLength);
        }
        if !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ReferralCodeError::InvalidCharacters);
        }
        Ok(Self(s.to_ascii_uppercase()))
    }

    /// Generate a new random referral code.
    #[must_use]
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(generate_code(rng, REFERRAL_CODE_LENGTH))
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the code and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ReferralCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ReferralCode {
    type Err = ReferralCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_generated_codes_avoid_ambiguous_characters() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let code = generate_code(&mut rng, 12);
            assert_eq!(code.len(), 12);
            assert!(!code.contains(['0', 'O', '1', 'I', 'L']), "{code}");
        }
    }

    #[test]
    fn test_generated_referral_code_parses() {
        let mut rng = StdRng::seed_from_u64(1);
        let code = ReferralCode::generate(&mut rng);
        assert_eq!(code.as_str().len(), REFERRAL_CODE_LENGTH);
        assert_eq!(ReferralCode::parse(code.as_str()).unwrap(), code);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(
            ReferralCode::parse("abc"),
            Err(ReferralCodeError::InvalidLength)
        );
        assert_eq!(
            ReferralCode::parse("ABCDEFGHIJKLMNOPQ"),
            Err(ReferralCodeError::InvalidLength)
        );
        assert_eq!(
            ReferralCode::parse("HAT-DIEU"),
            Err(ReferralCodeError::InvalidCharacters)
        );
        assert_eq!(
            ReferralCode::parse("HẠTĐIỀU"),
            Err(ReferralCodeError::InvalidCharacters)
        );
    }

    #[test]
    fn test_order_code_format() {
        let mut rng = StdRng::seed_from_u64(3);
        let date = NaiveDate::from_ymd_opt(2024, 10, 19).unwrap();
        let code = order_code(&mut rng, date);
        assert!(code.starts_with("NM241019-"), "{code}");
        assert_eq!(code.len(), "NM241019-".len() + 5);
    }

    #[test]
    fn test_voucher_code_prefix() {
        let mut rng = StdRng::seed_from_u64(9);
        let code = voucher_code(&mut rng);
        assert!(code.starts_with("VC-"));
        assert_eq!(code.len(), 13);
    }
}
