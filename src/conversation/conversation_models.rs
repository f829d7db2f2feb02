use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::message::message_models::Message;

/// Who is looking at the inbox, and which conversation they have open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationContext {
    pub current_user_id: Uuid,
    pub open_partner_id: Option<Uuid>,
}

impl ConversationContext {
    pub fn new(current_user_id: Uuid) -> Self {
        Self {
            current_user_id,
            open_partner_id: None,
        }
    }

    pub fn is_open(&self, partner_id: Uuid) -> bool {
        self.open_partner_id == Some(partner_id)
    }
}

/// All messages exchanged with one partner. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Conversation {
    pub partner_id: Uuid,
    pub messages: Vec<Message>,
    pub last_message: String,
    pub last_message_time: DateTime<Utc>,
    pub unread_count: i64,
}

impl Conversation {
    /// Returns `None` for an empty message list: a conversation only exists
    /// once something has been said.
    pub fn from_messages(
        partner_id: Uuid,
        mut messages: Vec<Message>,
        current_user_id: Uuid,
    ) -> Option<Self> {
        super::aggregator::sort_chronologically(&mut messages);

        let last = messages.last()?;
        let last_message = last.content.clone();
        let last_message_time = last.created_at;
        let unread_count = messages
            .iter()
            .filter(|m| m.is_unread_for(current_user_id))
            .count() as i64;

        Some(Self {
            partner_id,
            messages,
            last_message,
            last_message_time,
            unread_count,
        })
    }
}

/// List-view projection of a [`Conversation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConversationSummary {
    pub partner_id: Uuid,
    pub last_message: String,
    pub last_message_time: DateTime<Utc>,
    pub unread_count: i64,
    pub message_count: usize,
}

impl From<&Conversation> for ConversationSummary {
    fn from(conversation: &Conversation) -> Self {
        Self {
            partner_id: conversation.partner_id,
            last_message: conversation.last_message.clone(),
            last_message_time: conversation.last_message_time,
            unread_count: conversation.unread_count,
            message_count: conversation.messages.len(),
        }
    }
}

/// Result of reconciling one poll of the open conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub merged: Vec<Message>,
    /// More messages were polled than were held before.
    pub is_new: bool,
    /// Unread messages addressed to the viewer with no mark-as-read issued yet.
    pub to_mark: Vec<i64>,
}
