//! Conversation history: saving, listing and appending messages.

use std::sync::Arc;

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use super::response::{ApiJson, ApiResponse};
use crate::auth::AuthUser;
use crate::errors::app_error::{AppError, AppResult};
use crate::state::AppState;
use crate::store::{
    Conversation, DEFAULT_PREFERRED_LANGUAGE, Message, NewMessage, Role, StoreError,
};

const INVALID_CONVERSATION: &str = "Invalid conversationId";

// =============================================================================
// Request / Response Types
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBody {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub translated_content: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
}

impl From<MessageBody> for NewMessage {
    fn from(body: MessageBody) -> Self {
        NewMessage {
            role: body.role,
            content: body.content,
            translated_content: body.translated_content,
            audio_url: body.audio_url,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryCreate {
    pub user_id: Uuid,
    #[serde(default)]
    pub title: Option<String>,
    pub messages: Vec<MessageBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesCreate {
    pub conversation_id: String,
    pub messages: Vec<MessageBody>,
}

#[derive(Debug, Serialize)]
pub struct HistoryCreated {
    pub conversation_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct UserConversationsQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ConversationMessagesQuery {
    pub conversation_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
    pub translated_content: Option<String>,
    pub audio_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub conversation_id: Uuid,
    pub title: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub messages: Vec<HistoryMessage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: Uuid,
    pub title: Option<String>,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub translated_content: Option<String>,
    pub conversation_id: Uuid,
    pub audio_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Message> for HistoryMessage {
    fn from(m: Message) -> Self {
        Self {
            role: m.role,
            content: m.content,
            translated_content: m.translated_content,
            audio_url: m.audio_url,
            created_at: m.created_at,
        }
    }
}

impl From<Message> for ConversationMessage {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            role: m.role,
            content: m.content,
            translated_content: m.translated_content,
            conversation_id: m.conversation_id,
            audio_url: m.audio_url,
            created_at: m.created_at,
        }
    }
}

impl From<Conversation> for ConversationSummary {
    fn from(c: Conversation) -> Self {
        Self {
            id: c.id,
            title: c.title,
            user_id: c.user_id,
            created_at: c.created_at,
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn ensure_owner(caller: Uuid, owner: Uuid) -> AppResult<()> {
    if caller != owner {
        return Err(AppError::Forbidden(
            "Cannot access another user's history".to_string(),
        ));
    }
    Ok(())
}

async fn preferred_language(state: &AppState, user_id: Uuid) -> AppResult<String> {
    Ok(state
        .users
        .find_by_id(user_id)
        .await?
        .map(|u| u.preferred_language)
        .unwrap_or_else(|| DEFAULT_PREFERRED_LANGUAGE.to_string()))
}

// =============================================================================
// Handlers
// =============================================================================

/// `POST /history`. A missing title is generated from the user's messages.
pub async fn save_history(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    ApiJson(request): ApiJson<HistoryCreate>,
) -> AppResult<ApiResponse<HistoryCreated>> {
    ensure_owner(caller, request.user_id)?;

    let title = match request.title.filter(|t| !t.trim().is_empty()) {
        Some(title) => title,
        None => {
            let texts: Vec<String> = request
                .messages
                .iter()
                .filter(|m| m.role == Role::User)
                .map(|m| m.content.clone())
                .collect();
            let language = preferred_language(&state, caller).await?;
            state.language_model.generate_title(&texts, &language).await?
        }
    };

    let messages = request.messages.into_iter().map(NewMessage::from).collect();
    let conversation = state
        .conversations
        .create(request.user_id, Some(title), messages)
        .await?;

    info!(conversation_id = %conversation.id, user_id = %caller, "Conversation saved");
    Ok(ApiResponse::success(HistoryCreated {
        conversation_id: conversation.id,
    }))
}

/// `GET /history/{user_id}`. Conversations newest first, each with its messages.
pub async fn get_user_history(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> AppResult<ApiResponse<Vec<HistoryEntry>>> {
    let Path(user_id) = path.map_err(|e| AppError::Validation(e.body_text()))?;
    ensure_owner(caller, user_id)?;

    let conversations = state.conversations.list_by_owner(user_id).await?;
    let mut history = Vec::with_capacity(conversations.len());
    for conversation in conversations {
        let messages = state.conversations.messages(conversation.id).await?;
        history.push(HistoryEntry {
            conversation_id: conversation.id,
            title: conversation.title,
            created_at: conversation.created_at,
            messages: messages.into_iter().map(HistoryMessage::from).collect(),
        });
    }
    Ok(ApiResponse::success(history))
}

/// `GET /user-conversations?user_id=`
pub async fn get_user_conversations(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    query: Result<Query<UserConversationsQuery>, QueryRejection>,
) -> AppResult<ApiResponse<Vec<ConversationSummary>>> {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;
    ensure_owner(caller, query.user_id)?;

    let conversations = state.conversations.list_by_owner(query.user_id).await?;
    Ok(ApiResponse::success(
        conversations.into_iter().map(ConversationSummary::from).collect(),
    ))
}

/// `GET /conversation-messages?conversation_id=`. Oldest first.
pub async fn get_conversation_messages(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    query: Result<Query<ConversationMessagesQuery>, QueryRejection>,
) -> AppResult<ApiResponse<Vec<ConversationMessage>>> {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;

    let Some(conversation) = state.conversations.find(query.conversation_id).await? else {
        return Ok(ApiResponse::success(Vec::new()));
    };
    ensure_owner(caller, conversation.user_id)?;

    let messages = state.conversations.messages(conversation.id).await?;
    Ok(ApiResponse::success(
        messages.into_iter().map(ConversationMessage::from).collect(),
    ))
}

/// `POST /save-messages`. Appends to an existing conversation.
pub async fn save_messages(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    ApiJson(request): ApiJson<MessagesCreate>,
) -> AppResult<ApiResponse<()>> {
    let invalid = || AppError::BadRequest(INVALID_CONVERSATION.to_string());

    let conversation_id = Uuid::parse_str(&request.conversation_id).map_err(|_| invalid())?;
    let conversation = state
        .conversations
        .find(conversation_id)
        .await?
        .ok_or_else(invalid)?;
    ensure_owner(caller, conversation.user_id)?;

    let messages = request.messages.into_iter().map(NewMessage::from).collect();
    match state.conversations.append(conversation_id, messages).await {
        Ok(_) => Ok(ApiResponse::ok()),
        Err(StoreError::NotFound(_)) => Err(invalid()),
        Err(e) => Err(e.into()),
    }
}
