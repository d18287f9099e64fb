//! Persistent chat sessions.
//!
//! Sessions live in `chat_sessions`, a per-user index in
//! `chat_user_sessions`, and messages in `chat_messages` keyed by session
//! and sequence number so a prefix scan returns them in order.

use chrono::{DateTime, Utc};
use sled::transaction::{abort, ConflictableTransactionError, TransactionalTree};
use sled::Transactional;
use uuid::Uuid;

use super::types::{ChatError, ChatMessage, ChatResult, ChatSession, Role, Transcript};
use crate::identity::UserId;
use crate::storage::db::{decode, encode};
use crate::storage::keys::{pair_key, sequence_key, UUID_LEN};
use crate::storage::{DbError, LedgerDb};

type StagedChat<T> = Result<T, ConflictableTransactionError<ChatError>>;

fn staged_chat<T>(result: Result<T, DbError>) -> StagedChat<T> {
    result.map_err(|e| ConflictableTransactionError::Abort(e.into()))
}

#[derive(Debug, Clone)]
pub struct ChatStore {
    db: LedgerDb,
}

impl ChatStore {
    pub fn new(db: LedgerDb) -> Self {
        Self { db }
    }

    /// Start a new session for `user`.
    pub fn create_session(&self, user: UserId, title: Option<String>) -> ChatResult<ChatSession> {
        let now = Utc::now();
        let session = ChatSession {
            session_id: Uuid::new_v4(),
            user,
            title,
            created_at: now,
            updated_at: now,
        };
        let bytes = encode(&session)?;
        let index = pair_key(user.as_uuid(), &session.session_id);

        (&self.db.chat_sessions, &self.db.chat_user_sessions).transaction(
            |(sessions, by_user)| -> StagedChat<()> {
                sessions.insert(&session.session_id.as_bytes()[..], bytes.clone())?;
                by_user.insert(&index[..], Vec::<u8>::new())?;
                Ok(())
            },
        )?;
        Ok(session)
    }

    /// A session, if it belongs to `user`. Someone else's session is
    /// reported as missing.
    pub fn session(&self, user: UserId, session_id: Uuid) -> ChatResult<ChatSession> {
        let Some(raw) = self.db.chat_sessions.get(session_id.as_bytes())? else {
            return Err(ChatError::SessionNotFound(session_id));
        };
        let session: ChatSession = decode(&raw)?;
        if session.user != user {
            return Err(ChatError::SessionNotFound(session_id));
        }
        Ok(session)
    }

    /// Append a message and bump the session's `updated_at`.
    pub fn append(&self, session_id: Uuid, role: Role, content: &str) -> ChatResult<ChatMessage> {
        let message = ChatMessage {
            id: self.db.generate_id()?,
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        };
        let bytes = encode(&message)?;
        let key = sequence_key(&session_id, message.id);

        (&self.db.chat_sessions, &self.db.chat_messages).transaction(
            |(sessions, messages)| -> StagedChat<()> {
                touch(sessions, session_id, message.timestamp)?;
                messages.insert(&key[..], bytes.clone())?;
                Ok(())
            },
        )?;
        Ok(message)
    }

    /// All messages of a session, oldest first.
    pub fn messages(&self, session_id: Uuid) -> ChatResult<Vec<ChatMessage>> {
        self.db
            .chat_messages
            .scan_prefix(session_id.as_bytes())
            .values()
            .map(|raw| -> ChatResult<ChatMessage> { Ok(decode(&raw?)?) })
            .collect()
    }

    /// Every session of `user` with its messages, most recently updated
    /// first.
    pub fn transcripts(&self, user: UserId) -> ChatResult<Vec<Transcript>> {
        let mut sessions = Vec::new();
        for key in self.db.chat_user_sessions.scan_prefix(user.as_key()).keys() {
            let key = key?;
            let session_id = Uuid::from_slice(&key[UUID_LEN..])
                .map_err(|e| DbError::Serialization(e.to_string()))?;
            sessions.push(self.session(user, session_id)?);
        }
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        sessions
            .into_iter()
            .map(|session| -> ChatResult<Transcript> {
                let messages = self.messages(session.session_id)?;
                Ok(Transcript { session, messages })
            })
            .collect()
    }
}

fn touch(sessions: &TransactionalTree, session_id: Uuid, at: DateTime<Utc>) -> StagedChat<()> {
    let Some(raw) = sessions.get(session_id.as_bytes())? else {
        return abort(ChatError::SessionNotFound(session_id));
    };
    let mut session: ChatSession = staged_chat(decode(&raw))?;
    session.updated_at = at;
    sessions.insert(&session_id.as_bytes()[..], staged_chat(encode(&session))?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ChatStore {
        ChatStore::new(LedgerDb::open_temporary().unwrap())
    }

    #[test]
    fn sessions_are_scoped_to_their_owner() {
        let store = store();
        let (owner, other) = (UserId::new(), UserId::new());
        let session = store.create_session(owner, None).unwrap();

        assert_eq!(store.session(owner, session.session_id).unwrap(), session);
        assert!(matches!(
            store.session(other, session.session_id),
            Err(ChatError::SessionNotFound(_))
        ));
        assert!(matches!(
            store.session(owner, Uuid::new_v4()),
            Err(ChatError::SessionNotFound(_))
        ));
    }

    #[test]
    fn messages_come_back_in_order() {
        let store = store();
        let session = store.create_session(UserId::new(), None).unwrap();
        store.append(session.session_id, Role::User, "one").unwrap();
        store.append(session.session_id, Role::Assistant, "two").unwrap();
        store.append(session.session_id, Role::User, "three").unwrap();

        let contents: Vec<_> = store
            .messages(session.session_id)
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, ["one", "two", "three"]);
    }

    #[test]
    fn append_to_missing_session_fails() {
        let store = store();
        let missing = Uuid::new_v4();
        assert!(matches!(
            store.append(missing, Role::User, "hello"),
            Err(ChatError::SessionNotFound(id)) if id == missing
        ));
        assert!(store.messages(missing).unwrap().is_empty());
    }

    #[test]
    fn transcripts_order_by_last_update() {
        let store = store();
        let user = UserId::new();
        let older = store.create_session(user, Some("first".into())).unwrap();
        let newer = store.create_session(user, Some("second".into())).unwrap();
        store.create_session(UserId::new(), None).unwrap();

        store.append(older.session_id, Role::User, "bump").unwrap();

        let transcripts = store.transcripts(user).unwrap();
        assert_eq!(transcripts.len(), 2);
        assert_eq!(transcripts[0].session.session_id, older.session_id);
        assert_eq!(transcripts[0].messages.len(), 1);
        assert_eq!(transcripts[1].session.session_id, newer.session_id);
        assert!(transcripts[1].messages.is_empty());
    }
}
