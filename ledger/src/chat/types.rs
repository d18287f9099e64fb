//! Chat sessions, messages, and the chat error type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::TransactionError;
use thiserror::Error;
use uuid::Uuid;

use crate::identity::UserId;
use crate::storage::DbError;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ChatError {
    /// Empty or oversized prompt.
    #[error("{0}")]
    Validation(String),

    /// The session does not exist or belongs to someone else.
    #[error("chat session not found: {0}")]
    SessionNotFound(Uuid),

    /// The completion service failed or returned something unusable.
    #[error("completion service error: {0}")]
    Upstream(String),

    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

impl From<sled::Error> for ChatError {
    fn from(e: sled::Error) -> Self {
        ChatError::Storage(DbError::Sled(e))
    }
}

impl From<TransactionError<ChatError>> for ChatError {
    fn from(e: TransactionError<ChatError>) -> Self {
        match e {
            TransactionError::Abort(inner) => inner,
            TransactionError::Storage(e) => e.into(),
        }
    }
}

pub type ChatResult<T> = Result<T, ChatError>;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Who said it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Position within the session. Increasing, not contiguous.
    pub id: u64,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A conversation owned by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub session_id: Uuid,
    pub user: UserId,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A session together with its messages, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub session: ChatSession,
    pub messages: Vec<ChatMessage>,
}

/// Result of one prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub session_id: Uuid,
}
