//! Users, conversations and their messages.
//!
//! Storage is behind the [`UserStore`] and [`ConversationStore`] traits;
//! [`MemoryStore`] is the bundled implementation.

mod memory;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

pub use memory::MemoryStore;

pub const DEFAULT_PREFERRED_LANGUAGE: &str = "ja";

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Email already registered")]
    DuplicateEmail,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Models
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub preferred_language: String,
    pub created_at: OffsetDateTime,
    pub otp_code: Option<String>,
    pub otp_expires_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

/// Author of a message. Nothing else is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("invalid role: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: Role,
    pub content: String,
    pub translated_content: Option<String>,
    pub audio_url: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub translated_content: Option<String>,
    pub audio_url: Option<String>,
}

impl NewMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            translated_content: None,
            audio_url: None,
        }
    }
}

// =============================================================================
// Store Traits
// =============================================================================

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with [`StoreError::DuplicateEmail`] if the email is taken.
    async fn insert(&self, user: NewUser) -> StoreResult<User>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Replace the stored record with the same id.
    async fn update(&self, user: User) -> StoreResult<User>;

    /// Newest first.
    async fn list_recent(&self, limit: usize) -> StoreResult<Vec<User>>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create(
        &self,
        user_id: Uuid,
        title: Option<String>,
        messages: Vec<NewMessage>,
    ) -> StoreResult<Conversation>;

    /// Fails with [`StoreError::NotFound`] for an unknown conversation.
    async fn append(&self, conversation_id: Uuid, messages: Vec<NewMessage>)
    -> StoreResult<Vec<Message>>;

    async fn find(&self, conversation_id: Uuid) -> StoreResult<Option<Conversation>>;

    /// Newest first.
    async fn list_by_owner(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>>;

    /// Oldest first. Empty for an unknown conversation.
    async fn messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>>;
}
