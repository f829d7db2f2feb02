use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use crate::error::InboxError;
use crate::message::{Message, MessageDirection, UnreadCountResponse};

/// The message store as seen by the inbox.
#[async_trait]
pub trait MessageSource: Send + Sync + 'static {
    /// Every message the user sent or received, in no particular order.
    async fn list_messages(
        &self,
        user_id: Uuid,
        direction: MessageDirection,
    ) -> Result<Vec<Message>, InboxError>;

    /// Messages exchanged with one partner.
    async fn conversation(&self, user_id: Uuid, partner_id: Uuid) -> Result<Vec<Message>, InboxError>;

    async fn send_message(&self, receiver_id: Uuid, content: &str) -> Result<Message, InboxError>;

    /// Must be safe to call more than once for the same message.
    async fn mark_read(&self, message_id: i64) -> Result<(), InboxError>;

    /// Server-side unread badge.
    async fn unread_count(&self, user_id: Uuid) -> Result<i64, InboxError>;
}

/// [`MessageSource`] backed by the service's JSON API.
///
/// The bearer token identifies the user, so the `user_id` arguments are only
/// used for logging.
#[derive(Clone)]
pub struct HttpMessageSource {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Serialize)]
struct SendBody<'a> {
    receiver_id: Uuid,
    content: &'a str,
}

impl HttpMessageSource {
    /// Requests still unanswered after `timeout` fail with a transport error.
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, InboxError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/messages{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, InboxError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(InboxError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl MessageSource for HttpMessageSource {
    async fn list_messages(
        &self,
        user_id: Uuid,
        direction: MessageDirection,
    ) -> Result<Vec<Message>, InboxError> {
        tracing::trace!("Listing {} messages for {}", direction, user_id);

        let response = self
            .client
            .get(self.endpoint(""))
            .query(&[("direction", direction.to_string())])
            .bearer_auth(&self.token)
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }

    async fn conversation(&self, user_id: Uuid, partner_id: Uuid) -> Result<Vec<Message>, InboxError> {
        tracing::trace!("Fetching conversation between {} and {}", user_id, partner_id);

        let response = self
            .client
            .get(self.endpoint(&format!("/conversations/{}", partner_id)))
            .bearer_auth(&self.token)
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }

    async fn send_message(&self, receiver_id: Uuid, content: &str) -> Result<Message, InboxError> {
        let response = self
            .client
            .post(self.endpoint(""))
            .bearer_auth(&self.token)
            .json(&SendBody { receiver_id, content })
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }

    async fn mark_read(&self, message_id: i64) -> Result<(), InboxError> {
        let response = self
            .client
            .patch(self.endpoint(&format!("/{}/read", message_id)))
            .bearer_auth(&self.token)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<i64, InboxError> {
        tracing::trace!("Fetching unread count for {}", user_id);

        let response = self
            .client
            .get(self.endpoint("/unread-count"))
            .bearer_auth(&self.token)
            .send()
            .await?;

        let body: UnreadCountResponse = Self::check(response).await?.json().await?;
        Ok(body.unread_count)
    }
}
