use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// A direct message between two users. Rows are immutable apart from
/// `is_read`, which only ever goes from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Message {
    pub id: i64,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    /// Missing in a payload means unread.
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// The participant that is not `user_id`.
    pub fn partner_of(&self, user_id: Uuid) -> Uuid {
        if self.sender_id == user_id {
            self.receiver_id
        } else {
            self.sender_id
        }
    }

    pub fn is_unread_for(&self, user_id: Uuid) -> bool {
        self.receiver_id == user_id && !self.is_read
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    Sent,
    Received,
}

impl std::fmt::Display for MessageDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageDirection::Sent => write!(f, "sent"),
            MessageDirection::Received => write!(f, "received"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(sender_id: Uuid, receiver_id: Uuid, is_read: bool) -> Message {
        Message {
            id: 1,
            sender_id,
            receiver_id,
            content: "hello".to_string(),
            is_read,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_partner_of() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert_eq!(message(me, other, false).partner_of(me), other);
        assert_eq!(message(other, me, false).partner_of(me), other);
    }

    #[test]
    fn test_is_unread_for_receiver_only() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert!(message(other, me, false).is_unread_for(me));
        assert!(!message(other, me, true).is_unread_for(me));
        assert!(!message(me, other, false).is_unread_for(me));
    }

    #[test]
    fn test_missing_is_read_deserializes_as_unread() {
        let json = serde_json::json!({
            "id": 7,
            "sender_id": Uuid::new_v4(),
            "receiver_id": Uuid::new_v4(),
            "content": "hi",
            "created_at": "2026-10-17T10:00:00Z",
        });

        let message: Message = serde_json::from_value(json).unwrap();
        assert!(!message.is_read);
    }

    #[test]
    fn test_message_direction_display() {
        assert_eq!(MessageDirection::Sent.to_string(), "sent");
        assert_eq!(MessageDirection::Received.to_string(), "received");
    }
}
