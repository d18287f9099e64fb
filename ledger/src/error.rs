//! Error types for the ledger core.
//!
//! Every wallet, transfer, history, and identity operation returns a
//! [`LedgerError`]. Each variant maps to one [`ErrorKind`], which is what the
//! HTTP layer turns into a status code and what callers use to decide
//! whether a retry makes sense.

use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionError};
use thiserror::Error;
use uuid::Uuid;

use crate::identity::UserId;
use crate::storage::DbError;
use crate::transfer::IdempotencyKey;
use crate::vault::{Amount, AmountError, WalletNumber};

/// Coarse classification of a failure, stable across variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input, non-positive amount, wrong PIN length, etc.
    Validation,
    /// Wallet, recipient, user, or transaction absent (or not visible).
    NotFound,
    /// PIN mismatch or bad credentials.
    Unauthorized,
    /// Balance too low for the requested debit.
    InsufficientFunds,
    /// Uniqueness or idempotency violation.
    Conflict,
    /// Lock contention. Safe to retry.
    Busy,
    /// Storage or other infrastructure failure.
    Internal,
}

impl ErrorKind {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Busy)
    }

    /// Stable label, as it appears in error bodies and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Busy => "busy",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Errors returned by ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The amount could not be parsed or is out of range.
    #[error("invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    /// Any other malformed input.
    #[error("{0}")]
    Validation(String),

    /// Phase 2 of a transfer was submitted without a PIN.
    #[error("PIN is required to complete the transfer")]
    PinRequired,

    /// The PIN does not match the sender's stored secret.
    #[error("invalid PIN")]
    InvalidPin,

    /// Email/password or access token did not check out.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Sender and recipient are the same wallet.
    #[error("cannot transfer to your own wallet")]
    InvalidRecipient,

    /// No wallet carries the recipient number.
    #[error("recipient wallet not found: {0}")]
    RecipientNotFound(WalletNumber),

    /// No wallet for the given owner or number.
    #[error("wallet not found: {0}")]
    WalletNotFound(String),

    /// No such user.
    #[error("user not found: {0}")]
    UserNotFound(UserId),

    /// No such transaction, or the caller is not a party to it.
    #[error("transaction not found: {0}")]
    TransactionNotFound(Uuid),

    /// A unique record already exists (wallet for user, email, ...).
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A debit would take the balance below zero.
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Balance at the time of the check.
        available: Amount,
        /// Amount that was requested.
        requested: Amount,
    },

    /// A credit would push the balance past the maximum the ledger holds.
    #[error("balance overflow: current {current}, credit {credit}")]
    BalanceOverflow {
        /// Balance before the failed credit.
        current: Amount,
        /// The credit that did not fit.
        credit: Amount,
    },

    /// Could not lock a wallet within the configured timeout.
    #[error("wallet {0} is busy, retry the request")]
    Busy(WalletNumber),

    /// An idempotency key was reused with different transfer parameters.
    #[error("idempotency key {0} was already used for a different transfer")]
    IdempotencyConflict(IdempotencyKey),

    /// Could not find a free wallet number.
    #[error("wallet number space exhausted after {0} attempts")]
    NumberSpaceExhausted(u32),

    /// The password hasher rejected its input or parameters.
    #[error("credential hashing failed: {0}")]
    Hashing(String),

    /// Underlying storage failure.
    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

impl LedgerError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidAmount(_)
            | LedgerError::Validation(_)
            | LedgerError::PinRequired
            | LedgerError::InvalidRecipient
            | LedgerError::BalanceOverflow { .. } => ErrorKind::Validation,
            LedgerError::RecipientNotFound(_)
            | LedgerError::WalletNotFound(_)
            | LedgerError::UserNotFound(_)
            | LedgerError::TransactionNotFound(_) => ErrorKind::NotFound,
            LedgerError::InvalidPin | LedgerError::InvalidCredentials => ErrorKind::Unauthorized,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::AlreadyExists(_) | LedgerError::IdempotencyConflict(_) => {
                ErrorKind::Conflict
            }
            LedgerError::Busy(_) => ErrorKind::Busy,
            LedgerError::NumberSpaceExhausted(_)
            | LedgerError::Hashing(_)
            | LedgerError::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Shorthand for `self.kind().is_retryable()`.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl From<sled::Error> for LedgerError {
    fn from(e: sled::Error) -> Self {
        LedgerError::Storage(DbError::Sled(e))
    }
}

impl From<TransactionError<LedgerError>> for LedgerError {
    fn from(e: TransactionError<LedgerError>) -> Self {
        match e {
            TransactionError::Abort(inner) => inner,
            TransactionError::Storage(e) => LedgerError::Storage(DbError::Sled(e)),
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Result type inside a sled transaction closure.
pub(crate) type StagedResult<T> = ConflictableTransactionResult<T, LedgerError>;

/// Lift a fallible step into a sled transaction, aborting on error.
pub(crate) fn staged<T, E: Into<LedgerError>>(result: Result<T, E>) -> StagedResult<T> {
    result.map_err(|e| ConflictableTransactionError::Abort(e.into()))
}
