//! # Bank: Wiring
//!
//! One database handle, one lock table, and every service that works on
//! them. The node holds a single `Bank` and clones it into request handlers;
//! all clones share state.

use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::LedgerConfig;
use crate::error::LedgerResult;
use crate::identity::UserDirectory;
use crate::storage::LedgerDb;
use crate::transaction::TransactionLog;
use crate::transfer::TransferEngine;
use crate::vault::{NumberSource, WalletStore};

#[derive(Debug, Clone)]
pub struct Bank {
    pub db: LedgerDb,
    pub users: UserDirectory,
    pub wallets: WalletStore,
    pub transfers: TransferEngine,
    pub history: TransactionLog,
}

impl Bank {
    /// Open (or create) the ledger at `path`.
    pub fn open<P: AsRef<Path>>(path: P, config: LedgerConfig) -> LedgerResult<Self> {
        let db = LedgerDb::open(path.as_ref())?;
        info!(
            path = %path.as_ref().display(),
            users = db.user_count(),
            wallets = db.wallet_count(),
            transactions = db.transaction_count(),
            "ledger opened"
        );
        Ok(Self::from_db(db, config))
    }

    /// A throwaway ledger for tests and demos.
    pub fn open_temporary(config: LedgerConfig) -> LedgerResult<Self> {
        Ok(Self::from_db(LedgerDb::open_temporary()?, config))
    }

    pub fn from_db(db: LedgerDb, config: LedgerConfig) -> Self {
        let wallets = WalletStore::new(db.clone(), config);
        Self::assemble(db, wallets)
    }

    /// Rebuild with a different wallet number source.
    pub fn with_number_source(self, numbers: Arc<dyn NumberSource>) -> Self {
        let wallets = self.wallets.with_number_source(numbers);
        Self::assemble(self.db, wallets)
    }

    fn assemble(db: LedgerDb, wallets: WalletStore) -> Self {
        let users = UserDirectory::new(db.clone(), wallets.clone());
        let transfers = TransferEngine::new(db.clone(), wallets.clone(), Arc::new(users.clone()));
        let history = transfers.log().clone();
        Self {
            db,
            users,
            wallets,
            transfers,
            history,
        }
    }
}
