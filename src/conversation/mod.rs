pub mod aggregator;
pub mod conversation_models;

pub use aggregator::{
    build_conversations, refresh_conversation, sort_by_recent_activity, sort_chronologically,
    unread_total,
};
pub use conversation_models::{
    Conversation, ConversationContext, ConversationSummary, RefreshOutcome,
};
