use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Money is represented as integer cents to avoid floating-point precision issues.
/// 1 unit = 100 cents, so 50.00 = 5000 cents.
pub type Cents = i64;

/// Number of fractional digits kept for every monetary value.
pub const MONEY_SCALE: u32 = 2;

/// Format cents as a human-readable amount.
/// Example: 5000 -> "50.00", -1234 -> "-12.34"
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs_cents = cents.unsigned_abs();
    let units = abs_cents / 100;
    let remainder = abs_cents % 100;
    format!("{}{}.{:02}", sign, units, remainder)
}

/// Convert cents into a decimal with two fractional digits.
pub fn cents_to_decimal(cents: Cents) -> Decimal {
    Decimal::new(cents, MONEY_SCALE)
}

/// Round a decimal half-up to two places and convert it to cents.
///
/// Ties round away from zero, which is half-up for the positive amounts the
/// ledger deals with. Returns `None` if the value does not fit in `Cents`.
pub fn decimal_to_cents(value: Decimal) -> Option<Cents> {
    let rounded = value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.checked_mul(Decimal::ONE_HUNDRED)?.to_i64()
}

/// Parse user input such as "50", "12.5" or "100.005" into a decimal.
pub fn parse_amount(input: &str) -> Result<Decimal, AmountError> {
    Decimal::from_str(input.trim()).map_err(|_| AmountError::InvalidFormat(input.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    InvalidFormat(String),
    NotPositive(String),
    Overflow(String),
}

impl fmt::Display for AmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmountError::InvalidFormat(s) => write!(f, "invalid money format: '{}'", s),
            AmountError::NotPositive(s) => write!(f, "amount must be positive, got {}", s),
            AmountError::Overflow(s) => write!(f, "amount out of range: {}", s),
        }
    }
}

impl std::error::Error for AmountError {}

/// A strictly positive monetary amount, already rounded to cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(Cents);

impl Amount {
    /// Round `value` half-up to two places and reject anything that is not positive.
    pub fn from_decimal(value: Decimal) -> Result<Self, AmountError> {
        let cents = decimal_to_cents(value).ok_or_else(|| AmountError::Overflow(value.to_string()))?;
        Self::from_cents(cents).map_err(|_| AmountError::NotPositive(value.to_string()))
    }

    pub fn from_cents(cents: Cents) -> Result<Self, AmountError> {
        if cents > 0 {
            Ok(Self(cents))
        } else {
            Err(AmountError::NotPositive(format_cents(cents)))
        }
    }

    pub fn cents(&self) -> Cents {
        self.0
    }

    pub fn to_decimal(&self) -> Decimal {
        cents_to_decimal(self.0)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::from_decimal(value)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_decimal(parse_amount(s)?)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_cents(self.0))
    }
}
