use crate::{
    error::Result,
    message::message_models::{Message, MessageDirection},
};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, sender_id: Uuid, receiver_id: Uuid, content: &str) -> Result<Message> {
        let message = sqlx::query_as::<_, Message>(
            "INSERT INTO messages (sender_id, receiver_id, content)
             VALUES ($1, $2, $3)
             RETURNING *",
        )
        .bind(sender_id)
        .bind(receiver_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;

        Ok(message)
    }

    /// Every message the user sent or received, unordered.
    pub async fn find_by_direction(
        &self,
        user_id: Uuid,
        direction: MessageDirection,
    ) -> Result<Vec<Message>> {
        let sql = match direction {
            MessageDirection::Sent => "SELECT * FROM messages WHERE sender_id = $1",
            MessageDirection::Received => "SELECT * FROM messages WHERE receiver_id = $1",
        };

        let messages = sqlx::query_as::<_, Message>(sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(messages)
    }

    pub async fn find_conversation(&self, user_id: Uuid, other_user_id: Uuid) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages
             WHERE (sender_id = $1 AND receiver_id = $2)
                OR (sender_id = $2 AND receiver_id = $1)
             ORDER BY created_at ASC, id ASC",
        )
        .bind(user_id)
        .bind(other_user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    /// Flips `is_read` for a message addressed to `user_id`. Marking an
    /// already-read message returns it unchanged.
    pub async fn mark_as_read(&self, message_id: i64, user_id: Uuid) -> Result<Option<Message>> {
        let message = sqlx::query_as::<_, Message>(
            "UPDATE messages
             SET is_read = true
             WHERE id = $1 AND receiver_id = $2
             RETURNING *",
        )
        .bind(message_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(message)
    }

    pub async fn count_unread(&self, user_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages
             WHERE receiver_id = $1 AND is_read = false",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
