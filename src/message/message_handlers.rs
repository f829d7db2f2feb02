use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Sse,
    },
    Json,
};
use futures::stream::Stream;
use std::convert::Infallible;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use uuid::Uuid;
use validator::Validate;

use crate::{
    conversation::ConversationSummary,
    error::Result,
    message::{
        message_dto::{MessageListQuery, SendMessageRequest, UnreadCountResponse},
        message_models::{Message, MessageDirection},
    },
    middleware::AuthUser,
    state::AppState,
};

/// Send a message to another user
#[utoipa::path(
    post,
    path = "/api/messages",
    tag = "messages",
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message sent successfully", body = Message),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Receiver not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn send_message(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<SendMessageRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let message = state.message_service.send_message(user_id, payload).await?;

    // Push to the receiver's SSE stream, if any
    let _ = state.message_tx.send(message.clone());

    Ok((StatusCode::CREATED, Json(message)))
}

/// List every message the user sent or received
#[utoipa::path(
    get,
    path = "/api/messages",
    tag = "messages",
    params(
        ("direction" = MessageDirection, Query, description = "sent or received")
    ),
    responses(
        (status = 200, description = "Unordered list of messages", body = Vec<Message>),
        (status = 400, description = "Missing or unknown direction"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_messages(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<MessageListQuery>,
) -> Result<Json<Vec<Message>>> {
    let messages = state
        .message_service
        .list_messages(user_id, query.direction)
        .await?;

    Ok(Json(messages))
}

/// Conversation list, most recently active first
#[utoipa::path(
    get,
    path = "/api/messages/conversations",
    tag = "messages",
    responses(
        (status = 200, description = "Conversation summaries", body = Vec<ConversationSummary>),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_conversations(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<ConversationSummary>>> {
    let conversations = state.message_service.get_conversations(user_id).await?;

    Ok(Json(conversations.iter().map(ConversationSummary::from).collect()))
}

/// Messages exchanged with one partner, oldest first
#[utoipa::path(
    get,
    path = "/api/messages/conversations/{partner_id}",
    tag = "messages",
    params(
        ("partner_id" = Uuid, Path, description = "The other participant")
    ),
    responses(
        (status = 200, description = "Conversation messages", body = Vec<Message>),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(partner_id): Path<Uuid>,
) -> Result<Json<Vec<Message>>> {
    let messages = state
        .message_service
        .get_conversation(user_id, partner_id)
        .await?;

    Ok(Json(messages))
}

/// Mark a received message as read
#[utoipa::path(
    patch,
    path = "/api/messages/{id}/read",
    tag = "messages",
    params(
        ("id" = i64, Path, description = "Message ID")
    ),
    responses(
        (status = 200, description = "Message is read", body = Message),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No such message addressed to the caller")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn mark_message_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(message_id): Path<i64>,
) -> Result<Json<Message>> {
    let message = state.message_service.mark_read(user_id, message_id).await?;

    Ok(Json(message))
}

/// Unread messages addressed to the caller
#[utoipa::path(
    get,
    path = "/api/messages/unread-count",
    tag = "messages",
    responses(
        (status = 200, description = "Unread badge count", body = UnreadCountResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn unread_count(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UnreadCountResponse>> {
    let unread_count = state.message_service.unread_count(user_id).await?;

    Ok(Json(UnreadCountResponse { unread_count }))
}

/// Real-time message stream (SSE)
#[utoipa::path(
    get,
    path = "/api/messages/stream",
    tag = "messages",
    responses(
        (status = 200, description = "Message stream established"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn message_stream(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let rx = state.message_tx.subscribe();
    let stream = BroadcastStream::new(rx)
        .filter_map(move |result| match result {
            Ok(message) if message.receiver_id == user_id => {
                let json = serde_json::to_string(&message).ok()?;
                Some(Ok(Event::default().data(json)))
            }
            _ => None,
        });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
