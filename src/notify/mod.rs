pub mod telegram;

pub use telegram::TelegramNotifier;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Telegram API error for chat {chat_id}: {description}")]
    Api { chat_id: i64, description: String },
}

/// Who a notification is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// The withdrawal's owner, by chat id.
    User(i64),
    /// Every configured admin chat.
    Admins,
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Audience::User(chat_id) => write!(f, "user {}", chat_id),
            Audience::Admins => f.write_str("admins"),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, audience: Audience, text: &str) -> Result<(), NotifyError>;
}
