//! Follows a user's inbox from the terminal.
//!
//! Reads `HC_API_URL`, `HC_TOKEN` and `HC_USER_ID`, plus the optional
//! `HC_OPEN_PARTNER` to keep one conversation open and polled.

use anyhow::Context;
use health_connect::inbox::{HttpMessageSource, Inbox, InboxConfig, InboxSnapshot};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,health_connect=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = InboxConfig::from_env()?;
    let open_partner = std::env::var("HC_OPEN_PARTNER")
        .ok()
        .map(|v| v.parse::<Uuid>())
        .transpose()
        .context("HC_OPEN_PARTNER must be a UUID")?;

    tracing::info!(
        "Watching inbox of {} at {} (list every {:?}, conversation every {:?})",
        config.user_id,
        config.api_url,
        config.intervals.list,
        config.intervals.conversation
    );

    let source = Arc::new(HttpMessageSource::new(
        config.api_url,
        config.token,
        config.intervals.fetch_timeout,
    )?);
    let inbox = Inbox::spawn(source, config.user_id, config.intervals);
    if let Some(partner_id) = open_partner {
        inbox.open(partner_id)?;
    }

    let mut snapshots = inbox.subscribe();
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                report(&snapshot);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    inbox.shutdown().await;
    Ok(())
}

fn report(snapshot: &InboxSnapshot) {
    if snapshot.stale {
        tracing::warn!("Inbox data may be out of date");
    }

    tracing::info!(
        conversations = snapshot.conversations.len(),
        unread = snapshot.unread_total,
        server_unread = ?snapshot.server_unread,
        "Inbox updated"
    );

    for conversation in &snapshot.conversations {
        tracing::info!(
            "  {} [{} unread] {}: {}",
            conversation.partner_id,
            conversation.unread_count,
            conversation.last_message_time.format("%Y-%m-%d %H:%M"),
            conversation.last_message
        );
    }

    if let Some(open) = &snapshot.open_conversation {
        if open.has_new {
            tracing::info!("New messages with {}", open.partner_id);
        }
        for message in &open.messages {
            let marker = if message.is_read { ' ' } else { '*' };
            tracing::info!("  {} {} {}", marker, message.created_at.format("%H:%M"), message.content);
        }
    }
}
