use std::time::Duration;

use tracing::warn;
use uuid::Uuid;

use crate::conversation::Conversation;
use crate::message::Message;

/// Shortest period a refresh loop may run at.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Timing of the two refresh loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    /// Conversation list and unread badge.
    pub list: Duration,
    /// The open conversation only.
    pub conversation: Duration,
    /// A fetch still pending after this long counts as failed.
    pub fetch_timeout: Duration,
}

impl PollIntervals {
    /// Raises any value below [`MIN_POLL_INTERVAL`] to it.
    pub fn clamped(self) -> Self {
        let clamp = |name: &str, value: Duration| {
            if value < MIN_POLL_INTERVAL {
                warn!("{} of {:?} is too short, using {:?}", name, value, MIN_POLL_INTERVAL);
                MIN_POLL_INTERVAL
            } else {
                value
            }
        };

        Self {
            list: clamp("List interval", self.list),
            conversation: clamp("Conversation interval", self.conversation),
            fetch_timeout: clamp("Fetch timeout", self.fetch_timeout),
        }
    }
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            list: Duration::from_secs(30),
            conversation: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenConversation {
    pub partner_id: Uuid,
    pub messages: Vec<Message>,
    /// The last refresh brought in messages that were not there before.
    pub has_new: bool,
}

/// Everything a view needs to render the inbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboxSnapshot {
    pub conversations: Vec<Conversation>,
    pub open_conversation: Option<OpenConversation>,
    /// Sum of the local per-conversation unread counts.
    pub unread_total: i64,
    /// Last unread count reported by the server.
    pub server_unread: Option<i64>,
    /// The most recent refresh failed; data may be out of date.
    pub stale: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamped_raises_zero_values() {
        let intervals = PollIntervals {
            list: Duration::ZERO,
            conversation: Duration::from_millis(200),
            fetch_timeout: Duration::from_secs(3),
        }
        .clamped();

        assert_eq!(intervals.list, MIN_POLL_INTERVAL);
        assert_eq!(intervals.conversation, MIN_POLL_INTERVAL);
        assert_eq!(intervals.fetch_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_defaults_are_left_alone() {
        assert_eq!(PollIntervals::default().clamped(), PollIntervals::default());
    }
}
