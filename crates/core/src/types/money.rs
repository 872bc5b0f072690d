//! Money and percentage rates.
//!
//! All prices in Nutmart are Vietnamese đồng. The đồng has no minor unit in
//! practice, so [`Money`] always holds a whole, non-negative amount and every
//! calculation that can produce fractions (percentages) rounds back to whole
//! đồng, half away from zero.
//!
//! Amounts are capped at [`Money::MAX`], the largest value the `NUMERIC(14, 0)`
//! columns hold. Arithmetic saturates at the cap, so no combination of
//! prices, quantities and rates can overflow the underlying decimal.

use core::fmt;
use core::ops::{Add, AddAssign};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing [`Money`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// The amount is below zero.
    #[error("amount cannot be negative")]
    Negative,
    /// The amount has a fractional part.
    #[error("amount must be a whole number of dong")]
    Fractional,
    /// The amount is above [`Money::MAX`].
    #[error("amount cannot exceed 99999999999999 dong")]
    TooLarge,
}

/// Errors that can occur when constructing a [`Rate`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RateError {
    /// The rate is outside `0..=100`.
    #[error("rate must be between 0 and 100 percent")]
    OutOfRange,
}

/// An amount of Vietnamese đồng.
///
/// Serializes as a decimal string (`"125000"`) and accepts either a string or
/// a JSON number when deserializing.
///
/// ```
/// use nutmart_core::Money;
///
/// let price = Money::from_dong(125_000);
/// assert_eq!(price.times(2), Money::from_dong(250_000));
/// assert_eq!(price.to_string(), "125.000 ₫");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "Decimal", try_from = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Zero đồng.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// The largest representable amount, `10^14 - 1` đồng.
    pub const MAX: Self = Self(Decimal::from_parts(0x107A_3FFF, 0x5AF3, 0, false, 0));

    /// Create an amount from a whole number of đồng.
    ///
    /// Negative inputs are clamped to zero and large ones to [`Money::MAX`].
    #[must_use]
    pub fn from_dong(amount: i64) -> Self {
        Self::capped(Decimal::from(amount.max(0)))
    }

    fn capped(amount: Decimal) -> Self {
        Self(amount.min(Self::MAX.0))
    }

    /// Create an amount from a decimal.
    ///
    /// # Errors
    ///
    /// Returns an error if the amount is negative, not a whole number, or
    /// above [`Money::MAX`].
    pub fn new(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative);
        }
        if !amount.fract().is_zero() {
            return Err(MoneyError::Fractional);
        }
        if amount > Self::MAX.0 {
            return Err(MoneyError::TooLarge);
        }
        Ok(Self(amount.normalize()))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Whether the amount is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// The amount multiplied by a quantity, saturating at [`Money::MAX`].
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        self.0
            .checked_mul(Decimal::from(quantity))
            .map_or(Self::MAX, Self::capped)
    }

    /// Subtract, stopping at zero.
    #[must_use]
    pub fn saturating_sub(self, other: Self) -> Self {
        if other.0 >= self.0 {
            Self::ZERO
        } else {
            Self(self.0 - other.0)
        }
    }

    /// The given percentage of this amount, rounded to whole đồng.
    ///
    /// ```
    /// use nutmart_core::{Money, Rate};
    /// use rust_decimal::Decimal;
    ///
    /// let rate = Rate::new(Decimal::new(75, 1)).unwrap(); // 7.5%
    /// assert_eq!(Money::from_dong(10_001).percent(rate), Money::from_dong(750));
    /// ```
    #[must_use]
    pub fn percent(self, rate: Rate) -> Self {
        // Rates never exceed 100, so the result never exceeds self
        self.0
            .checked_mul(rate.0)
            .and_then(|raw| raw.checked_div(Decimal::ONE_HUNDRED))
            .map_or(self, |raw| {
                Self(raw.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
            })
    }

    /// The amount as whole đồng, if it fits in an `i64`.
    #[must_use]
    pub fn to_dong(&self) -> Option<i64> {
        self.0.to_i64()
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.0.checked_add(rhs.0).map_or(Self::MAX, Self::capped)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl core::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

/// Formats as `125.000 ₫` (dot thousands separator, as printed on Vietnamese receipts).
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.0.trunc().abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(c);
        }
        write!(f, "{grouped} ₫")
    }
}

/// A percentage between 0 and 100, e.g. a commission rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "Decimal", try_from = "Decimal")]
pub struct Rate(Decimal);

impl Rate {
    /// Zero percent.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a rate from a percentage.
    ///
    /// # Errors
    ///
    /// Returns `RateError::OutOfRange` outside `0..=100`.
    pub fn new(percent: Decimal) -> Result<Self, RateError> {
        if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
            return Err(RateError::OutOfRange);
        }
        Ok(Self(percent.normalize()))
    }

    /// Create a rate from a whole percentage, clamped to `0..=100`.
    #[must_use]
    pub fn from_percent(percent: u32) -> Self {
        Self(Decimal::from(percent.min(100)))
    }

    /// The percentage value.
    #[must_use]
    pub const fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Subtract, stopping at zero.
    #[must_use]
    pub fn saturating_sub(self, other: Self) -> Self {
        if other.0 >= self.0 {
            Self::ZERO
        } else {
            Self(self.0 - other.0)
        }
    }

    /// Whether the rate is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl TryFrom<Decimal> for Rate {
    type Error = RateError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rate> for Decimal {
    fn from(rate: Rate) -> Self {
        rate.0
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

// SQLx support (with postgres feature). Both map to NUMERIC.
#[cfg(feature = "postgres")]
mod pg {
    use rust_decimal::Decimal;
    use sqlx::Postgres;
    use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef};

    use super::{Money, Rate};

    macro_rules! numeric_newtype {
        ($name:ident) => {
            impl sqlx::Type<Postgres> for $name {
                fn type_info() -> PgTypeInfo {
                    <Decimal as sqlx::Type<Postgres>>::type_info()
                }

                fn compatible(ty: &PgTypeInfo) -> bool {
                    <Decimal as sqlx::Type<Postgres>>::compatible(ty)
                }
            }

            impl<'r> sqlx::Decode<'r, Postgres> for $name {
                fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
                    let amount = <Decimal as sqlx::Decode<Postgres>>::decode(value)?;
                    Ok($name::new(amount)?)
                }
            }

            impl sqlx::Encode<'_, Postgres> for $name {
                fn encode_by_ref(
                    &self,
                    buf: &mut PgArgumentBuffer,
                ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                    <Decimal as sqlx::Encode<Postgres>>::encode_by_ref(&self.0, buf)
                }
            }
        };
    }

    numeric_newtype!(Money);
    numeric_newtype!(Rate);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_money_rejects_negative_and_fractional() {
        assert_eq!(Money::new(Decimal::new(-1, 0)), Err(MoneyError::Negative));
        assert_eq!(Money::new(Decimal::new(15, 1)), Err(MoneyError::Fractional));
        assert!(Money::new(Decimal::new(1500, 0)).is_ok());
        // 1500.00 is still a whole amount
        assert!(Money::new(Decimal::new(150_000, 2)).is_ok());
    }

    #[test]
    fn test_money_percent_rounds_half_away_from_zero() {
        let five = Rate::from_percent(5);
        assert_eq!(Money::from_dong(10).percent(five), Money::from_dong(1)); // 0.5 -> 1
        assert_eq!(Money::from_dong(29).percent(five), Money::from_dong(1)); // 1.45 -> 1
        assert_eq!(Money::from_dong(30).percent(five), Money::from_dong(2)); // 1.5 -> 2
        assert_eq!(Money::from_dong(0).percent(five), Money::ZERO);
    }

    #[test]
    fn test_money_saturating_sub() {
        let a = Money::from_dong(100);
        let b = Money::from_dong(250);
        assert_eq!(a.saturating_sub(b), Money::ZERO);
        assert_eq!(b.saturating_sub(a), Money::from_dong(150));
    }

    #[test]
    fn test_money_sum_and_times() {
        let total: Money = [Money::from_dong(1000), Money::from_dong(2500)]
            .into_iter()
            .sum();
        assert_eq!(total, Money::from_dong(3500));
        assert_eq!(Money::from_dong(45_000).times(3), Money::from_dong(135_000));
    }

    #[test]
    fn test_money_max_matches_column_width() {
        assert_eq!(Money::MAX.amount(), Decimal::from(99_999_999_999_999_i64));
        assert_eq!(Money::new(Money::MAX.amount()), Ok(Money::MAX));
        assert_eq!(
            Money::new(Money::MAX.amount() + Decimal::ONE),
            Err(MoneyError::TooLarge)
        );
        assert_eq!(Money::from_dong(i64::MAX), Money::MAX);
    }

    #[test]
    fn test_money_arithmetic_saturates_instead_of_overflowing() {
        let huge = Money::MAX;
        assert_eq!(huge.times(u32::MAX), Money::MAX);
        assert_eq!(huge + huge, Money::MAX);

        let mut total = Money::from_dong(1);
        total += Money::MAX;
        assert_eq!(total, Money::MAX);

        assert_eq!(huge.percent(Rate::from_percent(100)), Money::MAX);
        assert_eq!(
            huge.percent(Rate::from_percent(50)),
            Money::from_dong(50_000_000_000_000)
        );
        assert!(serde_json::from_str::<Money>("\"100000000000000\"").is_err());
    }

    #[test]
    fn test_money_display_groups_thousands() {
        assert_eq!(Money::ZERO.to_string(), "0 ₫");
        assert_eq!(Money::from_dong(950).to_string(), "950 ₫");
        assert_eq!(Money::from_dong(1_250_000).to_string(), "1.250.000 ₫");
    }

    #[test]
    fn test_money_deserializes_from_number_and_string() {
        let from_number: Money = serde_json::from_str("125000").unwrap();
        let from_string: Money = serde_json::from_str("\"125000\"").unwrap();
        assert_eq!(from_number, from_string);
        assert!(serde_json::from_str::<Money>("-5").is_err());
    }

    #[test]
    fn test_rate_bounds() {
        assert!(Rate::new(Decimal::new(-1, 0)).is_err());
        assert!(Rate::new(Decimal::new(101, 0)).is_err());
        assert!(Rate::new(Decimal::ONE_HUNDRED).is_ok());
        assert_eq!(Rate::from_percent(250), Rate::from_percent(100));
    }

    #[test]
    fn test_rate_saturating_sub() {
        let ten = Rate::from_percent(10);
        let seven = Rate::from_percent(7);
        assert_eq!(ten.saturating_sub(seven), Rate::from_percent(3));
        assert_eq!(seven.saturating_sub(ten), Rate::ZERO);
    }
}
