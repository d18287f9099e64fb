// Copyright (c) 2026 AfriTrade. MIT License.
// See LICENSE for details.

//! # AfriTrade Ledger: Core Library
//!
//! The custodial money core behind AfriTrade. Every user owns exactly one
//! wallet, and value moves between wallets only through an atomic transfer
//! that also appends an immutable record to the transaction log.
//!
//! ## Architecture
//!
//! - **config**: Limits, widths, and tunables. One place for every constant.
//! - **storage**: The sled database and its named trees.
//! - **vault**: Amounts, wallets, wallet numbers, and the wallet store.
//! - **transaction**: The append-only transaction log and its queries.
//! - **transfer**: The two-phase (verify, then commit) transfer engine.
//! - **identity**: Users, credentials, and the PIN gate used by transfers.
//! - **chat**: The trade-advisor chat proxy. Not money, but it lives here.
//! - **bank**: Wires everything above onto one database handle.
//!
//! ## Ground Rules
//!
//! 1. Money is never created or destroyed by a transfer. Debit, credit, and
//!    log entry land together or not at all.
//! 2. A balance is never negative after a committed operation.
//! 3. All amounts are integer minor units. No floats anywhere near a balance.
//! 4. A transfer locks exactly the two wallets it touches, in a fixed order,
//!    and gives up with a retryable error instead of waiting forever.

pub mod bank;
pub mod chat;
pub mod config;
pub mod error;
pub mod identity;
pub mod storage;
pub mod transaction;
pub mod transfer;
pub mod vault;

pub use bank::Bank;
pub use error::{ErrorKind, LedgerError, LedgerResult};
