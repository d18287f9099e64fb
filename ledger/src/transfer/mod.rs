//! # Transfer Module
//!
//! Peer-to-peer transfers between wallets. See [`engine`] for the protocol
//! and [`request`] for what goes in and comes out.

pub mod engine;
pub mod request;

pub use engine::TransferEngine;
pub use request::{IdempotencyKey, TransferReceipt, TransferRequest, TransferStep, Verification};
