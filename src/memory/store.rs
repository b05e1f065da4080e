//! Conversation persistence.

use super::{ConversationState, ConversationTurn, ConversationUpdate};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Where conversations live. Unknown ids read as empty conversations.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn history(&self, conversation_id: &str) -> Result<Vec<ConversationTurn>>;

    async fn referenced_items(&self, conversation_id: &str) -> Result<Vec<String>>;

    async fn is_opening_sent(&self, conversation_id: &str) -> Result<bool>;

    /// Persist the outcome of one completed exchange.
    async fn apply(&self, conversation_id: &str, update: ConversationUpdate) -> Result<()>;

    /// Everything the pipeline reads, in one call.
    async fn state(&self, conversation_id: &str) -> Result<ConversationState> {
        Ok(ConversationState {
            history: self.history(conversation_id).await?,
            referenced_items: self.referenced_items(conversation_id).await?,
            opening_sent: self.is_opening_sent(conversation_id).await?,
        })
    }
}

/// In-process conversation store.
#[derive(Default)]
pub struct MemoryConversationStore {
    conversations: RwLock<HashMap<String, ConversationState>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a conversation, replacing any existing one.
    pub fn insert(&self, conversation_id: impl Into<String>, state: ConversationState) {
        self.conversations
            .write()
            .unwrap()
            .insert(conversation_id.into(), state);
    }

    /// Number of stored conversations.
    pub fn len(&self) -> usize {
        self.conversations.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn history(&self, conversation_id: &str) -> Result<Vec<ConversationTurn>> {
        Ok(self
            .conversations
            .read()
            .unwrap()
            .get(conversation_id)
            .map(|c| c.history.clone())
            .unwrap_or_default())
    }

    async fn referenced_items(&self, conversation_id: &str) -> Result<Vec<String>> {
        Ok(self
            .conversations
            .read()
            .unwrap()
            .get(conversation_id)
            .map(|c| c.referenced_items.clone())
            .unwrap_or_default())
    }

    async fn is_opening_sent(&self, conversation_id: &str) -> Result<bool> {
        Ok(self
            .conversations
            .read()
            .unwrap()
            .get(conversation_id)
            .is_some_and(|c| c.opening_sent))
    }

    async fn apply(&self, conversation_id: &str, update: ConversationUpdate) -> Result<()> {
        let mut conversations = self.conversations.write().unwrap();
        let state = conversations.entry(conversation_id.to_string()).or_default();

        state.history.push(ConversationTurn::user(update.user_turn));
        state.history.push(ConversationTurn::assistant(update.assistant_turn));
        state.referenced_items = update.referenced_items;
        state.opening_sent = state.opening_sent || update.opening_sent;

        debug!(
            conversation_id,
            turns = state.history.len(),
            "Applied conversation update"
        );
        Ok(())
    }
}
