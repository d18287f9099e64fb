//! # Wallets & Wallet Numbers
//!
//! A [`Wallet`] is the one balance a user owns. It is addressed two ways:
//! by its owner's [`UserId`] and by a public six-digit [`WalletNumber`] that
//! other users type in when sending money.
//!
//! ## Number Allocation
//!
//! Numbers are drawn uniformly from `000000..=999999` through a
//! [`NumberSource`]. The store redraws on collision and gives up after a
//! configured number of attempts. The source is a trait so tests can force
//! collisions and specific numbers.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::amount::Amount;
use crate::config::{WALLET_NUMBER_DIGITS, WALLET_NUMBER_MAX};
use crate::error::{LedgerError, LedgerResult};
use crate::identity::UserId;

// ---------------------------------------------------------------------------
// WalletNumber
// ---------------------------------------------------------------------------

/// Six ASCII digits, zero-padded. Ordered numerically.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletNumber([u8; WALLET_NUMBER_DIGITS]);

impl WalletNumber {
    /// Parse user input. Surrounding whitespace is ignored; anything other
    /// than exactly six digits is rejected.
    pub fn parse(input: &str) -> LedgerResult<Self> {
        let s = input.trim();
        let bytes = s.as_bytes();
        if bytes.len() != WALLET_NUMBER_DIGITS || !bytes.iter().all(u8::is_ascii_digit) {
            return Err(LedgerError::Validation(format!(
                "wallet number must be exactly {WALLET_NUMBER_DIGITS} digits"
            )));
        }
        let mut digits = [0u8; WALLET_NUMBER_DIGITS];
        digits.copy_from_slice(bytes);
        Ok(Self(digits))
    }

    /// Zero-pad a drawn value. `None` if it does not fit in six digits.
    pub fn from_u32(value: u32) -> Option<Self> {
        if value > WALLET_NUMBER_MAX {
            return None;
        }
        let text = format!("{value:0width$}", width = WALLET_NUMBER_DIGITS);
        let mut digits = [0u8; WALLET_NUMBER_DIGITS];
        digits.copy_from_slice(text.as_bytes());
        Some(Self(digits))
    }

    /// Rebuild from a stored key. `None` on corrupt input.
    pub fn from_key(bytes: &[u8]) -> Option<Self> {
        std::str::from_utf8(bytes).ok().and_then(|s| Self::parse(s).ok())
    }

    /// The six digits as a string slice.
    pub fn as_str(&self) -> &str {
        // Construction guarantees ASCII digits.
        std::str::from_utf8(&self.0).unwrap_or("??????")
    }

    /// Key bytes for the `wallets` tree.
    pub fn as_key(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for WalletNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for WalletNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WalletNumber({})", self.as_str())
    }
}

impl FromStr for WalletNumber {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for WalletNumber {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<WalletNumber> for String {
    fn from(number: WalletNumber) -> Self {
        number.as_str().to_string()
    }
}

// ---------------------------------------------------------------------------
// Number Sources
// ---------------------------------------------------------------------------

/// Where candidate wallet numbers come from.
pub trait NumberSource: Send + Sync {
    /// Draw one candidate in `0..=WALLET_NUMBER_MAX`.
    fn draw(&self) -> u32;
}

/// Uniform draws from the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomNumberSource;

impl NumberSource for RandomNumberSource {
    fn draw(&self) -> u32 {
        rand::thread_rng().gen_range(0..=WALLET_NUMBER_MAX)
    }
}

// ---------------------------------------------------------------------------
// Balance Deltas
// ---------------------------------------------------------------------------

/// A signed change to one balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceDelta {
    Credit(Amount),
    Debit(Amount),
}

impl BalanceDelta {
    /// Compute the balance after this delta, or the reason it cannot apply.
    pub fn apply_to(self, balance: Amount) -> LedgerResult<Amount> {
        match self {
            BalanceDelta::Credit(credit) => {
                balance
                    .checked_add(credit)
                    .ok_or(LedgerError::BalanceOverflow {
                        current: balance,
                        credit,
                    })
            }
            BalanceDelta::Debit(requested) => {
                balance
                    .checked_sub(requested)
                    .ok_or(LedgerError::InsufficientFunds {
                        available: balance,
                        requested,
                    })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

/// One user's balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Public wallet number.
    pub number: WalletNumber,

    /// The owning user. Exactly one wallet per user.
    pub owner: UserId,

    /// Current balance. Never negative.
    pub balance: Amount,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// A fresh wallet with a zero balance.
    pub fn new(number: WalletNumber, owner: UserId, now: DateTime<Utc>) -> Self {
        Self {
            number,
            owner,
            balance: Amount::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a delta in place and return the new balance.
    pub fn apply(&mut self, delta: BalanceDelta, now: DateTime<Utc>) -> LedgerResult<Amount> {
        self.balance = delta.apply_to(self.balance)?;
        self.updated_at = now;
        Ok(self.balance)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_six_digits_only() {
        assert_eq!(WalletNumber::parse("000042").unwrap().as_str(), "000042");
        assert_eq!(WalletNumber::parse(" 123456 ").unwrap().as_str(), "123456");
        assert!(WalletNumber::parse("12345").is_err());
        assert!(WalletNumber::parse("1234567").is_err());
        assert!(WalletNumber::parse("12a456").is_err());
        assert!(WalletNumber::parse("").is_err());
    }

    #[test]
    fn from_u32_pads_with_zeros() {
        assert_eq!(WalletNumber::from_u32(42).unwrap().to_string(), "000042");
        assert_eq!(WalletNumber::from_u32(0).unwrap().to_string(), "000000");
        assert_eq!(WalletNumber::from_u32(999_999).unwrap().to_string(), "999999");
        assert!(WalletNumber::from_u32(1_000_000).is_none());
    }

    #[test]
    fn ordering_is_numeric() {
        let low = WalletNumber::from_u32(99).unwrap();
        let high = WalletNumber::from_u32(100).unwrap();
        assert!(low < high);
    }

    #[test]
    fn serde_uses_plain_string() {
        let number = WalletNumber::parse("004200").unwrap();
        assert_eq!(serde_json::to_string(&number).unwrap(), "\"004200\"");
        let back: WalletNumber = serde_json::from_str("\"004200\"").unwrap();
        assert_eq!(back, number);
        assert!(serde_json::from_str::<WalletNumber>("\"42\"").is_err());
    }

    #[test]
    fn random_source_stays_in_range() {
        let source = RandomNumberSource;
        for _ in 0..1_000 {
            assert!(WalletNumber::from_u32(source.draw()).is_some());
        }
    }

    #[test]
    fn debit_past_zero_is_insufficient() {
        let err = BalanceDelta::Debit(Amount::from_minor(5_000))
            .apply_to(Amount::from_minor(2_000))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
    }

    #[test]
    fn credit_past_max_overflows() {
        let err = BalanceDelta::Credit(Amount::from_minor(1))
            .apply_to(Amount::MAX)
            .unwrap_err();
        assert!(matches!(err, LedgerError::BalanceOverflow { .. }));
    }

    #[test]
    fn apply_updates_timestamp() {
        let created = Utc::now();
        let mut wallet = Wallet::new(WalletNumber::from_u32(1).unwrap(), UserId::new(), created);
        let later = created + chrono::Duration::seconds(5);
        let balance = wallet
            .apply(BalanceDelta::Credit(Amount::from_minor(10_000)), later)
            .unwrap();
        assert_eq!(balance, Amount::from_minor(10_000));
        assert_eq!(wallet.updated_at, later);
        assert_eq!(wallet.created_at, created);
    }
}
