//! # Storage Module
//!
//! Persistent storage for the ledger. One embedded sled database, many named
//! trees, and multi-tree transactions for anything that must land together.
//!
//! ## Design Decisions
//!
//! 1. **One database, one process.** The ledger is custodial and single-node;
//!    sled gives us durable, transactional storage without a server.
//!
//! 2. **Bincode on disk.** Compact, fast, deterministic. JSON is for the API.
//!
//! 3. **Fixed-width keys.** User ids, transaction ids, timestamps, and wallet
//!    numbers all have fixed byte widths so that prefix scans and reverse
//!    iteration give ordered results for free.

pub mod db;
pub mod keys;

pub use db::{DbError, DbResult, LedgerDb};
