//! The trade-advisor conversation flow.

use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::client::{CompletionClient, CompletionMessage};
use super::store::ChatStore;
use super::types::{ChatError, ChatReply, ChatResult, Role, Transcript};
use crate::config::MAX_PROMPT_CHARS;
use crate::identity::UserId;

/// Session titles are the opening of the first prompt.
const TITLE_CHARS: usize = 60;

#[derive(Clone)]
pub struct ChatService {
    store: ChatStore,
    client: Arc<dyn CompletionClient>,
    system_prompt: String,
}

impl ChatService {
    pub fn new(store: ChatStore, client: Arc<dyn CompletionClient>, system_prompt: String) -> Self {
        Self {
            store,
            client,
            system_prompt,
        }
    }

    /// Send `prompt` in a new or existing session and persist both turns.
    ///
    /// The user's turn is stored before the upstream call, so a failed call
    /// leaves it in the history and the next prompt resends it as context.
    #[instrument(skip_all, fields(user = %user, session = ?session_id))]
    pub async fn send(
        &self,
        user: UserId,
        prompt: &str,
        session_id: Option<Uuid>,
    ) -> ChatResult<ChatReply> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ChatError::Validation("prompt must not be empty".into()));
        }
        if prompt.chars().count() > MAX_PROMPT_CHARS {
            return Err(ChatError::Validation(format!(
                "prompt must be at most {MAX_PROMPT_CHARS} characters"
            )));
        }

        let session = match session_id {
            Some(id) => self.store.session(user, id)?,
            None => self.store.create_session(user, Some(title_for(prompt)))?,
        };
        self.store.append(session.session_id, Role::User, prompt)?;

        let mut conversation = vec![CompletionMessage::new(Role::System, self.system_prompt.as_str())];
        conversation.extend(
            self.store
                .messages(session.session_id)?
                .into_iter()
                .map(|m| CompletionMessage::new(m.role, m.content)),
        );

        let reply = match self.client.complete(&conversation).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "chat completion failed");
                return Err(e);
            }
        };
        self.store.append(session.session_id, Role::Assistant, &reply)?;

        info!(session = %session.session_id, turns = conversation.len(), "chat reply stored");
        Ok(ChatReply {
            reply,
            session_id: session.session_id,
        })
    }

    /// The user's sessions with their messages, most recently updated first.
    pub fn sessions(&self, user: UserId) -> ChatResult<Vec<Transcript>> {
        self.store.transcripts(user)
    }
}

fn title_for(prompt: &str) -> String {
    let first_line = prompt.lines().next().unwrap_or(prompt).trim();
    if first_line.chars().count() <= TITLE_CHARS {
        first_line.to_string()
    } else {
        let cut: String = first_line.chars().take(TITLE_CHARS).collect();
        format!("{}…", cut.trim_end())
    }
}
