use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;
use uuid::Uuid;

use super::message_models::MessageDirection;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SendMessageRequest {
    pub receiver_id: Uuid,
    #[validate(length(min = 1, max = 5000))]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageListQuery {
    pub direction: MessageDirection,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UnreadCountResponse {
    pub unread_count: i64,
}
