//! # Chat Module: Trade Advisor
//!
//! A thin proxy in front of a hosted language model. Users send prompts,
//! the service keeps the conversation in sled, and every call upstream
//! carries the system prompt plus the full session history.
//!
//! Nothing here touches balances.

pub mod client;
pub mod service;
pub mod store;
pub mod types;

pub use client::{CompletionClient, CompletionMessage, OpenRouterClient};
pub use service::ChatService;
pub use store::ChatStore;
pub use types::{ChatError, ChatMessage, ChatReply, ChatResult, ChatSession, Role, Transcript};
