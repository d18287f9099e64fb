//! # Transaction Module
//!
//! The immutable record of money that moved. A transaction is written once,
//! by the transfer engine, in the same atomic unit as the balance changes it
//! describes. Nothing in the crate updates or deletes one.

pub mod log;
pub mod types;

pub use log::{History, TransactionLog};
pub use types::{Direction, Transaction};
