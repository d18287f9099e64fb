//! # Transaction Log
//!
//! Append-only storage for completed transfers plus a per-participant index.
//!
//! Each transfer writes one record to `transactions` and two index entries
//! to `participants`: one under the sender (outgoing) and one under the
//! receiver (incoming). Index keys end in a commit sequence number and the
//! transaction id, so a reverse prefix scan walks a user's history newest
//! first without sorting anything.

use sled::transaction::TransactionalTree;
use sled::Tree;
use tracing::warn;
use uuid::Uuid;

use super::types::{Direction, Transaction};
use crate::error::{staged, LedgerError, LedgerResult, StagedResult};
use crate::identity::UserId;
use crate::storage::db::{decode, encode};
use crate::storage::keys::{participant_key, participant_tx_id};
use crate::storage::{DbError, LedgerDb};

/// Read side of the transaction log, plus the staged append used by the
/// transfer engine.
#[derive(Debug, Clone)]
pub struct TransactionLog {
    db: LedgerDb,
}

impl TransactionLog {
    pub fn new(db: LedgerDb) -> Self {
        Self { db }
    }

    /// Append a transaction and its index entries inside a transaction over
    /// `transactions` and `participants`.
    ///
    /// There is no unstaged variant: a record only lands together with the
    /// balance changes it describes.
    pub(crate) fn record_transfer(
        transactions: &TransactionalTree,
        participants: &TransactionalTree,
        tx: &Transaction,
        seq: u64,
    ) -> StagedResult<()> {
        let bytes = staged(encode(tx))?;
        transactions.insert(&tx.id.as_bytes()[..], bytes)?;

        let outgoing = participant_key(tx.sender.as_uuid(), seq, &tx.id);
        let incoming = participant_key(tx.receiver.as_uuid(), seq, &tx.id);
        participants.insert(&outgoing[..], &[Direction::Outgoing.as_byte()][..])?;
        participants.insert(&incoming[..], &[Direction::Incoming.as_byte()][..])?;
        Ok(())
    }

    /// Every transaction `user` took part in, newest first, optionally
    /// limited to one direction.
    ///
    /// The iterator is lazy and holds no cursor state in the database;
    /// calling this again starts from the newest entry.
    pub fn list_for(&self, user: UserId, direction: Option<Direction>) -> History {
        History {
            entries: self.db.participants.scan_prefix(user.as_key()).rev(),
            transactions: self.db.transactions.clone(),
            direction,
        }
    }

    /// One transaction, if `user` is its sender or receiver.
    ///
    /// A transaction that exists but belongs to others is reported exactly
    /// like one that does not exist.
    pub fn get_by_id(&self, user: UserId, id: Uuid) -> LedgerResult<Transaction> {
        let tx = load(&self.db.transactions, id)?.ok_or(LedgerError::TransactionNotFound(id))?;
        if tx.involves(user) {
            Ok(tx)
        } else {
            Err(LedgerError::TransactionNotFound(id))
        }
    }

    /// A transaction by id with no participant check. Crate-internal.
    pub(crate) fn find(&self, id: Uuid) -> LedgerResult<Option<Transaction>> {
        load(&self.db.transactions, id)
    }
}

fn load(transactions: &Tree, id: Uuid) -> LedgerResult<Option<Transaction>> {
    match transactions.get(id.as_bytes())? {
        Some(raw) => Ok(Some(decode(&raw)?)),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// History iterator
// ---------------------------------------------------------------------------

/// Lazy, newest-first walk over one user's transactions.
pub struct History {
    entries: std::iter::Rev<sled::Iter>,
    transactions: Tree,
    direction: Option<Direction>,
}

impl Iterator for History {
    type Item = LedgerResult<Transaction>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (key, value) = match self.entries.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };

            if let Some(wanted) = self.direction {
                let stored = value.first().copied().and_then(Direction::from_byte);
                if stored != Some(wanted) {
                    continue;
                }
            }

            let Some(id) = participant_tx_id(&key) else {
                warn!(len = key.len(), "malformed participant index key");
                return Some(Err(DbError::Serialization("malformed participant key".into()).into()));
            };

            return Some(match load(&self.transactions, id) {
                Ok(Some(tx)) => Ok(tx),
                Ok(None) => Err(DbError::NotFound(format!("transaction {id}")).into()),
                Err(e) => Err(e),
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
