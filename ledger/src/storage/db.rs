//! # LedgerDb: Persistent Storage Engine
//!
//! The persistence layer for the ledger, built on sled's embedded key-value
//! store. All on-disk data flows through this module.
//!
//! ## Tree Layout
//!
//! | Tree                 | Key                               | Value                    |
//! |----------------------|-----------------------------------|--------------------------|
//! | `users`              | `user_id` (16B)                   | `bincode(User)`          |
//! | `user_emails`        | normalized email (UTF-8)          | `user_id` (16B)          |
//! | `sessions`           | BLAKE3(token) (32B)               | `bincode(SessionRecord)` |
//! | `wallets`            | wallet number (6B ASCII)          | `bincode(Wallet)`        |
//! | `wallet_owners`      | `user_id` (16B)                   | wallet number (6B)       |
//! | `transactions`       | `tx_id` (16B)                     | `bincode(Transaction)`   |
//! | `participants`       | `user_id` ‖ seq (8B BE) ‖ `tx_id` | direction (1B)           |
//! | `idempotency`        | `user_id` ‖ key (16B)             | `tx_id` (16B)            |
//! | `chat_sessions`      | `session_id` (16B)                | `bincode(ChatSession)`   |
//! | `chat_user_sessions` | `user_id` ‖ `session_id`          | empty                    |
//! | `chat_messages`      | `session_id` ‖ seq (8B BE)        | `bincode(ChatMessage)`   |
//!
//! Sequence numbers are big-endian so that sled's lexicographic order
//! matches numeric order. Reverse iteration over a user's `participants`
//! prefix yields their history newest first.
//!
//! ## Atomicity
//!
//! Anything that touches more than one record runs as a sled multi-tree
//! transaction. The trees are exposed to the rest of the crate so that the
//! wallet store, the transaction log, and the transfer engine can compose
//! their staged writes into a single unit.

use serde::{de::DeserializeOwned, Serialize};
use sled::{Db, Tree};
use std::path::Path;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("key not found: {0}")]
    NotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Encode a value for storage.
pub fn encode<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

/// Decode a stored value.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// LedgerDb
// ---------------------------------------------------------------------------

/// Persistent storage engine for the ledger.
///
/// Cloning is cheap: sled handles are reference counted, and every clone
/// sees the same data.
///
/// # Thread Safety
///
/// sled trees support concurrent reads and serializable multi-tree
/// transactions. `LedgerDb` can be shared across threads without external
/// synchronization. Exclusive access to wallet balances is layered on top by
/// [`WalletLocks`](crate::vault::WalletLocks).
#[derive(Debug, Clone)]
pub struct LedgerDb {
    db: Db,
    pub(crate) users: Tree,
    pub(crate) user_emails: Tree,
    pub(crate) sessions: Tree,
    pub(crate) wallets: Tree,
    pub(crate) wallet_owners: Tree,
    pub(crate) transactions: Tree,
    pub(crate) participants: Tree,
    pub(crate) idempotency: Tree,
    pub(crate) chat_sessions: Tree,
    pub(crate) chat_user_sessions: Tree,
    pub(crate) chat_messages: Tree,
}

impl LedgerDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when the last handle
    /// is dropped. No filesystem cleanup needed in tests.
    pub fn open_temporary() -> DbResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        Ok(Self {
            users: db.open_tree("users")?,
            user_emails: db.open_tree("user_emails")?,
            sessions: db.open_tree("sessions")?,
            wallets: db.open_tree("wallets")?,
            wallet_owners: db.open_tree("wallet_owners")?,
            transactions: db.open_tree("transactions")?,
            participants: db.open_tree("participants")?,
            idempotency: db.open_tree("idempotency")?,
            chat_sessions: db.open_tree("chat_sessions")?,
            chat_user_sessions: db.open_tree("chat_user_sessions")?,
            chat_messages: db.open_tree("chat_messages")?,
            db,
        })
    }

    /// Number of users on record.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Number of wallets on record.
    pub fn wallet_count(&self) -> usize {
        self.wallets.len()
    }

    /// Number of committed transfers on record.
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// A database-wide, strictly increasing id. Survives restarts.
    pub fn generate_id(&self) -> DbResult<u64> {
        Ok(self.db.generate_id()?)
    }

    /// Force a flush of all pending writes to disk.
    ///
    /// Blocks until the data is durable on the underlying device.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
