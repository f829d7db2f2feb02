use anyhow::Context;
use std::time::Duration;
use uuid::Uuid;

use super::inbox_models::PollIntervals;

#[derive(Debug, Clone)]
pub struct InboxConfig {
    pub api_url: String,
    pub token: String,
    pub user_id: Uuid,
    pub intervals: PollIntervals,
}

impl InboxConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = PollIntervals::default();

        Ok(Self {
            api_url: std::env::var("HC_API_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:3000".to_string()),
            token: std::env::var("HC_TOKEN").context("HC_TOKEN must be set")?,
            user_id: std::env::var("HC_USER_ID")
                .context("HC_USER_ID must be set")?
                .parse()
                .context("HC_USER_ID must be a UUID")?,
            intervals: PollIntervals {
                list: secs_from_env("HC_LIST_POLL_SECS", defaults.list)?,
                conversation: secs_from_env("HC_CONVERSATION_POLL_SECS", defaults.conversation)?,
                fetch_timeout: secs_from_env("HC_FETCH_TIMEOUT_SECS", defaults.fetch_timeout)?,
            },
        })
    }
}

fn secs_from_env(key: &str, default: Duration) -> anyhow::Result<Duration> {
    match std::env::var(key) {
        Ok(value) => {
            let secs: u64 = value
                .parse()
                .with_context(|| format!("{} must be a number of seconds", key))?;
            anyhow::ensure!(secs > 0, "{} must be greater than zero", key);
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(default),
    }
}
