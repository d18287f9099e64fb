//! # Wallet Store
//!
//! Persistent wallet operations over the `wallets` and `wallet_owners`
//! trees. The store owns the lock table, so every balance change it makes
//! happens under the right lock.
//!
//! The `stage_*` helpers run inside a caller's sled transaction. That is how
//! user registration creates a wallet atomically with the user, and how the
//! transfer engine debits, credits, and logs in one unit.

use chrono::{DateTime, Utc};
use sled::transaction::TransactionalTree;
use sled::Transactional;
use std::sync::Arc;
use tracing::{debug, info};

use super::amount::Amount;
use super::locks::WalletLocks;
use super::wallet::{BalanceDelta, NumberSource, RandomNumberSource, Wallet, WalletNumber};
use crate::config::LedgerConfig;
use crate::error::{staged, LedgerError, LedgerResult, StagedResult};
use crate::identity::UserId;
use crate::storage::db::{decode, encode};
use crate::storage::LedgerDb;

/// Wallet records and the only sanctioned way to change a balance.
#[derive(Clone)]
pub struct WalletStore {
    db: LedgerDb,
    locks: Arc<WalletLocks>,
    numbers: Arc<dyn NumberSource>,
    config: LedgerConfig,
}

impl WalletStore {
    /// Create a store drawing wallet numbers at random.
    pub fn new(db: LedgerDb, config: LedgerConfig) -> Self {
        Self {
            db,
            locks: Arc::new(WalletLocks::new(config.lock_timeout)),
            numbers: Arc::new(RandomNumberSource),
            config,
        }
    }

    /// Replace the wallet number source.
    pub fn with_number_source(mut self, numbers: Arc<dyn NumberSource>) -> Self {
        self.numbers = numbers;
        self
    }

    /// The shared lock table.
    pub fn locks(&self) -> &WalletLocks {
        &self.locks
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The wallet owned by `owner`.
    pub fn get_wallet(&self, owner: UserId) -> LedgerResult<Wallet> {
        let number = self
            .db
            .wallet_owners
            .get(owner.as_key())?
            .and_then(|raw| WalletNumber::from_key(&raw))
            .ok_or_else(|| LedgerError::WalletNotFound(owner.to_string()))?;
        self.find_wallet_by_number(number)
            .map_err(|_| LedgerError::WalletNotFound(owner.to_string()))
    }

    /// The wallet carrying `number`.
    pub fn find_wallet_by_number(&self, number: WalletNumber) -> LedgerResult<Wallet> {
        match self.db.wallets.get(number.as_key())? {
            Some(raw) => Ok(decode(&raw)?),
            None => Err(LedgerError::WalletNotFound(number.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Create the wallet for `owner` with a zero balance and a fresh number.
    ///
    /// Registration normally does this as part of creating the user; this
    /// entry point exists for users that predate their wallet.
    pub fn create_wallet(&self, owner: UserId) -> LedgerResult<Wallet> {
        let now = Utc::now();
        let wallet = (&self.db.wallets, &self.db.wallet_owners)
            .transaction(|(wallets, owners)| self.stage_new_wallet(wallets, owners, owner, now))?;
        self.maybe_flush()?;
        info!(owner = %owner, number = %wallet.number, "wallet created");
        Ok(wallet)
    }

    /// Apply a credit or debit to one wallet under its lock.
    pub fn apply_delta(&self, number: WalletNumber, delta: BalanceDelta) -> LedgerResult<Amount> {
        let balance = self.locks.with_one(number, || {
            let now = Utc::now();
            let balance = self.db.wallets.transaction(|wallets| -> StagedResult<Amount> {
                let mut wallet = stage_read_wallet(wallets, number)?;
                let balance = staged(wallet.apply(delta, now))?;
                stage_write_wallet(wallets, &wallet)?;
                Ok(balance)
            })?;
            Ok(balance)
        })?;
        self.maybe_flush()?;
        debug!(number = %number, ?delta, balance = %balance, "balance updated");
        Ok(balance)
    }

    /// Credit `amount` to the wallet of `owner`. Returns the new balance.
    pub fn deposit(&self, owner: UserId, amount: Amount) -> LedgerResult<Amount> {
        let amount = amount.ensure_positive()?;
        let wallet = self.get_wallet(owner)?;
        let balance = self.apply_delta(wallet.number, BalanceDelta::Credit(amount))?;
        info!(owner = %owner, number = %wallet.number, amount = %amount, "deposit");
        Ok(balance)
    }

    pub(crate) fn maybe_flush(&self) -> LedgerResult<()> {
        if self.config.flush_on_commit {
            self.db.flush()?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Staged operations
    // -----------------------------------------------------------------------

    /// Allocate a number and write a new wallet inside a transaction over
    /// `wallets` and `wallet_owners`.
    pub(crate) fn stage_new_wallet(
        &self,
        wallets: &TransactionalTree,
        owners: &TransactionalTree,
        owner: UserId,
        now: DateTime<Utc>,
    ) -> StagedResult<Wallet> {
        if owners.get(owner.as_key())?.is_some() {
            return sled::transaction::abort(LedgerError::AlreadyExists(format!(
                "wallet for user {owner}"
            )));
        }

        let attempts = self.config.wallet_number_attempts;
        for _ in 0..attempts {
            let Some(number) = WalletNumber::from_u32(self.numbers.draw()) else {
                continue;
            };
            if wallets.get(number.as_key())?.is_some() {
                continue;
            }
            let wallet = Wallet::new(number, owner, now);
            stage_write_wallet(wallets, &wallet)?;
            owners.insert(owner.as_key(), number.as_key())?;
            return Ok(wallet);
        }
        sled::transaction::abort(LedgerError::NumberSpaceExhausted(attempts))
    }
}

impl std::fmt::Debug for WalletStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletStore")
            .field("db", &self.db)
            .field("locks", &self.locks)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Read a wallet inside a transaction. Aborts with `WalletNotFound`.
pub(crate) fn stage_read_wallet(
    wallets: &TransactionalTree,
    number: WalletNumber,
) -> StagedResult<Wallet> {
    match wallets.get(number.as_key())? {
        Some(raw) => staged(decode(&raw)),
        None => sled::transaction::abort(LedgerError::WalletNotFound(number.to_string())),
    }
}

/// Write a wallet inside a transaction.
pub(crate) fn stage_write_wallet(wallets: &TransactionalTree, wallet: &Wallet) -> StagedResult<()> {
    let bytes = staged(encode(wallet))?;
    wallets.insert(wallet.number.as_key(), bytes)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
