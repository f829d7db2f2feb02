use crate::conversation::{build_conversations, Conversation, ConversationContext};
use crate::error::{AppError, Result};
use crate::message::message_dto::SendMessageRequest;
use crate::message::message_models::{Message, MessageDirection};
use crate::message::message_repository::MessageRepository;
use crate::user::user_repository::UserRepository;
use uuid::Uuid;

#[derive(Clone)]
pub struct MessageService {
    repo: MessageRepository,
    user_repo: UserRepository,
}

impl MessageService {
    pub fn new(repo: MessageRepository, user_repo: UserRepository) -> Self {
        Self { repo, user_repo }
    }

    pub async fn send_message(&self, sender_id: Uuid, payload: SendMessageRequest) -> Result<Message> {
        if payload.receiver_id == sender_id {
            return Err(AppError::BadRequest("Cannot send a message to yourself".to_string()));
        }

        self.user_repo
            .find_by_id(payload.receiver_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Receiver not found".to_string()))?;

        let message = self
            .repo
            .create(sender_id, payload.receiver_id, &payload.content)
            .await?;

        tracing::debug!("Message {} sent from {} to {}", message.id, sender_id, message.receiver_id);
        Ok(message)
    }

    pub async fn list_messages(&self, user_id: Uuid, direction: MessageDirection) -> Result<Vec<Message>> {
        self.repo.find_by_direction(user_id, direction).await
    }

    pub async fn get_conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let sent = self.repo.find_by_direction(user_id, MessageDirection::Sent).await?;
        let received = self.repo.find_by_direction(user_id, MessageDirection::Received).await?;

        Ok(build_conversations(&sent, &received, &ConversationContext::new(user_id)))
    }

    pub async fn get_conversation(&self, user_id: Uuid, other_user_id: Uuid) -> Result<Vec<Message>> {
        self.repo.find_conversation(user_id, other_user_id).await
    }

    pub async fn mark_read(&self, user_id: Uuid, message_id: i64) -> Result<Message> {
        self.repo
            .mark_as_read(message_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Message not found".to_string()))
    }

    pub async fn unread_count(&self, user_id: Uuid) -> Result<i64> {
        self.repo.count_unread(user_id).await
    }
}
