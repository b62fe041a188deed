use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    Conversation, ConversationStore, Message, NewMessage, NewUser, StoreError, StoreResult, User,
    UserStore, DEFAULT_PREFERRED_LANGUAGE,
};

struct UserRecord {
    seq: u64,
    user: User,
}

struct ConversationRecord {
    seq: u64,
    conversation: Conversation,
    messages: Vec<Message>,
}

/// Process-local store. Contents are lost on restart.
///
/// A monotonic sequence number breaks ties between records created within
/// the same clock tick, so listings stay stable.
#[derive(Default)]
pub struct MemoryStore {
    seq: AtomicU64,
    users: DashMap<Uuid, UserRecord>,
    emails: DashMap<String, Uuid>,
    conversations: DashMap<Uuid, ConversationRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn materialize(conversation_id: Uuid, messages: Vec<NewMessage>) -> Vec<Message> {
        messages
            .into_iter()
            .map(|m| Message {
                id: Uuid::new_v4(),
                conversation_id,
                role: m.role,
                content: m.content,
                translated_content: m.translated_content,
                audio_url: m.audio_url,
                created_at: OffsetDateTime::now_utc(),
            })
            .collect()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert(&self, new_user: NewUser) -> StoreResult<User> {
        let id = Uuid::new_v4();
        match self.emails.entry(new_user.email.clone()) {
            Entry::Occupied(_) => return Err(StoreError::DuplicateEmail),
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        let user = User {
            id,
            email: new_user.email,
            name: new_user.name,
            password_hash: new_user.password_hash,
            preferred_language: DEFAULT_PREFERRED_LANGUAGE.to_string(),
            created_at: OffsetDateTime::now_utc(),
            otp_code: None,
            otp_expires_at: None,
        };
        self.users.insert(
            id,
            UserRecord {
                seq: self.next_seq(),
                user: user.clone(),
            },
        );
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.users.get(&id).map(|record| record.user.clone()))
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let Some(id) = self.emails.get(email).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        self.find_by_id(id).await
    }

    async fn update(&self, user: User) -> StoreResult<User> {
        let mut record = self
            .users
            .get_mut(&user.id)
            .ok_or(StoreError::NotFound("User"))?;
        if record.user.email != user.email {
            return Err(StoreError::Unavailable(
                "changing a user's email is not supported".to_string(),
            ));
        }
        record.user = user.clone();
        Ok(user)
    }

    async fn list_recent(&self, limit: usize) -> StoreResult<Vec<User>> {
        let mut records: Vec<(u64, User)> = self
            .users
            .iter()
            .map(|r| (r.seq, r.user.clone()))
            .collect();
        records.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(records.into_iter().take(limit).map(|(_, u)| u).collect())
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create(
        &self,
        user_id: Uuid,
        title: Option<String>,
        messages: Vec<NewMessage>,
    ) -> StoreResult<Conversation> {
        let conversation = Conversation {
            id: Uuid::new_v4(),
            user_id,
            title,
            created_at: OffsetDateTime::now_utc(),
        };
        let messages = Self::materialize(conversation.id, messages);
        self.conversations.insert(
            conversation.id,
            ConversationRecord {
                seq: self.next_seq(),
                conversation: conversation.clone(),
                messages,
            },
        );
        Ok(conversation)
    }

    async fn append(
        &self,
        conversation_id: Uuid,
        messages: Vec<NewMessage>,
    ) -> StoreResult<Vec<Message>> {
        let mut record = self
            .conversations
            .get_mut(&conversation_id)
            .ok_or(StoreError::NotFound("Conversation"))?;
        let appended = Self::materialize(conversation_id, messages);
        record.messages.extend(appended.iter().cloned());
        Ok(appended)
    }

    async fn find(&self, conversation_id: Uuid) -> StoreResult<Option<Conversation>> {
        Ok(self
            .conversations
            .get(&conversation_id)
            .map(|r| r.conversation.clone()))
    }

    async fn list_by_owner(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>> {
        let mut owned: Vec<(u64, Conversation)> = self
            .conversations
            .iter()
            .filter(|r| r.conversation.user_id == user_id)
            .map(|r| (r.seq, r.conversation.clone()))
            .collect();
        owned.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(owned.into_iter().map(|(_, c)| c).collect())
    }

    async fn messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>> {
        Ok(self
            .conversations
            .get(&conversation_id)
            .map(|r| r.messages.clone())
            .unwrap_or_default())
    }
}
