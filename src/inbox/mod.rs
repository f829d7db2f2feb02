pub mod inbox_client;
pub mod inbox_config;
pub mod inbox_models;
pub mod inbox_service;
pub mod read_tracker;

pub use inbox_client::{HttpMessageSource, MessageSource};
pub use inbox_config::InboxConfig;
pub use inbox_models::{InboxSnapshot, OpenConversation, PollIntervals};
pub use inbox_service::{Inbox, InboxHandle};
pub use read_tracker::ReadTracker;
