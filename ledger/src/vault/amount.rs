//! # Fixed-Precision Amounts
//!
//! An [`Amount`] is a non-negative quantity of money in minor units (cents).
//! Arithmetic is integer arithmetic with explicit overflow checks. The two
//! decimal places only show up at the edges: parsing client input and
//! rendering balances.
//!
//! On the wire an amount is a decimal string (`"70.00"`). Clients may also
//! send a plain JSON number; it is converted through its shortest decimal
//! representation, never through float arithmetic on the balance.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::{AMOUNT_DECIMALS, MAX_BALANCE_MINOR, MINOR_UNITS_PER_MAJOR};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons an amount can be rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,

    #[error("amount must not be negative")]
    Negative,

    #[error("amount must be greater than zero")]
    NotPositive,

    #[error("amount has more than {AMOUNT_DECIMALS} decimal places")]
    TooPrecise,

    #[error("amount exceeds the maximum of {}", Amount::MAX)]
    TooLarge,

    #[error("'{0}' is not a decimal number")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// Amount
// ---------------------------------------------------------------------------

/// A non-negative amount of money with two decimal places.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u64);

impl Amount {
    /// Zero.
    pub const ZERO: Amount = Amount(0);

    /// The largest amount the ledger holds.
    pub const MAX: Amount = Amount(MAX_BALANCE_MINOR);

    /// Build from minor units. Values above [`Amount::MAX`] are allowed
    /// here; range checks happen in [`Amount::checked_add`] and parsing.
    pub const fn from_minor(minor: u64) -> Self {
        Amount(minor)
    }

    /// Build from whole units and cents.
    pub fn from_parts(major: u64, minor: u8) -> Result<Self, AmountError> {
        if u64::from(minor) >= MINOR_UNITS_PER_MAJOR {
            return Err(AmountError::TooPrecise);
        }
        let value = major
            .checked_mul(MINOR_UNITS_PER_MAJOR)
            .and_then(|v| v.checked_add(u64::from(minor)))
            .ok_or(AmountError::TooLarge)?;
        Self::bounded(value)
    }

    /// Parse a decimal string such as `"30"`, `"30.5"` or `"30.50"`.
    pub fn parse(input: &str) -> Result<Self, AmountError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(AmountError::Empty);
        }
        if s.starts_with('-') {
            return Err(AmountError::Negative);
        }
        let s = s.strip_prefix('+').unwrap_or(s);

        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(AmountError::Malformed(input.to_string()));
        }
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(whole) || !all_digits(frac) {
            return Err(AmountError::Malformed(input.to_string()));
        }

        // Trailing zeros beyond two places carry no value ("1.500" is 1.50).
        let frac = frac.trim_end_matches('0');
        if frac.len() > AMOUNT_DECIMALS as usize {
            return Err(AmountError::TooPrecise);
        }

        let whole = whole.trim_start_matches('0');
        if whole.len() > 10 {
            return Err(AmountError::TooLarge);
        }
        let major: u64 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| AmountError::Malformed(input.to_string()))?
        };
        let minor: u64 = match frac.len() {
            0 => 0,
            1 => u64::from(frac.as_bytes()[0] - b'0') * 10,
            _ => frac
                .parse()
                .map_err(|_| AmountError::Malformed(input.to_string()))?,
        };

        let value = major
            .checked_mul(MINOR_UNITS_PER_MAJOR)
            .and_then(|v| v.checked_add(minor))
            .ok_or(AmountError::TooLarge)?;
        Self::bounded(value)
    }

    fn bounded(minor: u64) -> Result<Self, AmountError> {
        if minor > MAX_BALANCE_MINOR {
            Err(AmountError::TooLarge)
        } else {
            Ok(Amount(minor))
        }
    }

    /// Minor units.
    pub const fn minor(self) -> u64 {
        self.0
    }

    /// Returns `true` for zero.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Reject zero. Transfers and deposits must move something.
    pub fn ensure_positive(self) -> Result<Self, AmountError> {
        if self.is_zero() {
            Err(AmountError::NotPositive)
        } else {
            Ok(self)
        }
    }

    /// Addition that refuses to go past [`Amount::MAX`].
    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0
            .checked_add(other.0)
            .filter(|v| *v <= MAX_BALANCE_MINOR)
            .map(Amount)
    }

    /// Subtraction that refuses to go below zero.
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:02}",
            self.0 / MINOR_UNITS_PER_MAJOR,
            self.0 % MINOR_UNITS_PER_MAJOR
        )
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Amount::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Serde
// ---------------------------------------------------------------------------

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            serializer.serialize_u64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_any(DecimalVisitor)
        } else {
            u64::deserialize(deserializer).map(Amount)
        }
    }
}

struct DecimalVisitor;

impl<'de> Visitor<'de> for DecimalVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a decimal amount with at most two decimal places")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
        Amount::parse(v).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
        Amount::from_parts(v, 0).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
        let v = u64::try_from(v).map_err(|_| E::custom(AmountError::Negative))?;
        self.visit_u64(v)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Amount, E> {
        if !v.is_finite() {
            return Err(E::custom(AmountError::Malformed(v.to_string())));
        }
        // Shortest round-trip representation: 30.1 stays "30.1".
        Amount::parse(&v.to_string()).map_err(E::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
