//! Transfer inputs and outputs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::transaction::Transaction;
use crate::vault::{Amount, WalletNumber};

// ---------------------------------------------------------------------------
// Idempotency Key
// ---------------------------------------------------------------------------

/// Client-chosen key that makes a transfer commit safe to retry.
///
/// Keys are scoped to the sender: two users may pick the same key without
/// interfering with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(Uuid);

impl IdempotencyKey {
    /// A fresh random key.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn parse(input: &str) -> LedgerResult<Self> {
        Uuid::parse_str(input.trim())
            .map(Self)
            .map_err(|e| LedgerError::Validation(format!("invalid idempotency key: {e}")))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for IdempotencyKey {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// Which phase of the protocol a request is for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStep {
    /// Look up the recipient. Nothing moves.
    #[default]
    Verify,
    /// Commit with a PIN.
    Transfer,
}

// ---------------------------------------------------------------------------
// Request / Response
// ---------------------------------------------------------------------------

/// Everything phase 2 needs. Nothing from phase 1 is remembered, so the
/// caller sends it all again.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub recipient: WalletNumber,
    pub amount: Amount,
    pub description: Option<String>,
    pub pin: Option<String>,
    pub idempotency_key: Option<IdempotencyKey>,
}

impl TransferRequest {
    pub fn new(recipient: WalletNumber, amount: Amount) -> Self {
        Self {
            recipient,
            amount,
            description: None,
            pin: None,
            idempotency_key: None,
        }
    }

    pub fn with_pin(mut self, pin: impl Into<String>) -> Self {
        self.pin = Some(pin.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: IdempotencyKey) -> Self {
        self.idempotency_key = Some(key);
        self
    }
}

/// Result of phase 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub recipient_name: String,
    pub recipient_number: WalletNumber,
    pub amount: Amount,
}

/// Result of a committed (or replayed) phase 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    /// The transaction that moved the money.
    pub transaction: Transaction,

    /// Sender's balance after the commit. For a replay, the current balance.
    pub balance: Amount,

    /// `true` when an earlier commit under the same idempotency key was
    /// returned instead of moving money again.
    pub replayed: bool,
}
