//! # Vault Module: Balances & Wallets
//!
//! Where money lives. Every balance in the ledger is a [`Wallet`] record in
//! the `wallets` tree, and every change to one goes through the
//! [`WalletStore`].
//!
//! ## Architecture
//!
//! ```text
//! amount.rs : Fixed-precision money: parsing, display, checked arithmetic
//! wallet.rs : Wallet records, wallet numbers, balance deltas
//! locks.rs  : Per-wallet lock table with bounded waits
//! store.rs  : Persistent wallet operations: create, look up, mutate
//! ```
//!
//! ## Design Principles
//!
//! 1. **All amounts are `u64` minor units.** Two decimals are for display
//!    and parsing only; arithmetic never divides.
//!
//! 2. **No unguarded balance writes.** A balance changes only under its
//!    wallet's lock, inside a sled transaction.

pub mod amount;
pub mod locks;
pub mod store;
pub mod wallet;

pub use amount::{Amount, AmountError};
pub use locks::WalletLocks;
pub use store::WalletStore;
pub use wallet::{BalanceDelta, NumberSource, RandomNumberSource, Wallet, WalletNumber};
