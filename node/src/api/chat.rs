//! Trade advisor handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use afritrade_ledger::chat::{ChatMessage, ChatReply, Transcript};

use super::{ApiError, ApiResult, AppState, AuthUser};

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub prompt: String,
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
}

impl From<Transcript> for SessionView {
    fn from(transcript: Transcript) -> Self {
        let Transcript { session, messages } = transcript;
        Self {
            session_id: session.session_id,
            title: session.title,
            created_at: session.created_at,
            updated_at: session.updated_at,
            messages,
        }
    }
}

/// `POST /chatbot`
pub async fn ask(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> ApiResult<Json<ChatReply>> {
    let Json(request) = payload?;
    let reply = state
        .chat
        .send(user, &request.prompt, request.session_id)
        .await?;
    Ok(Json(reply))
}

/// `GET /chatbot/sessions`
pub async fn sessions(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Vec<SessionView>>> {
    let chat = state.chat.clone();
    let transcripts = match tokio::task::spawn_blocking(move || chat.sessions(user)).await {
        Ok(result) => result?,
        Err(e) => {
            tracing::error!(error = %e, "chat history task failed");
            return Err(ApiError::internal("chat history task failed"));
        }
    };
    Ok(Json(transcripts.into_iter().map(SessionView::from).collect()))
}
