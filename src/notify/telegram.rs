use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Audience, NotifyError, Notifier};
use crate::config::TelegramConfig;

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Delivers notifications through the Telegram Bot API `sendMessage` call.
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    bot_token: String,
    admin_chat_ids: Vec<i64>,
}

impl TelegramNotifier {
    pub fn new(api_base: &str, bot_token: String, admin_chat_ids: Vec<i64>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token,
            admin_chat_ids,
        }
    }

    pub fn from_config(config: &TelegramConfig) -> Self {
        Self::new(
            &config.api_base,
            config.get_bot_token(),
            config.admin_chat_ids.clone(),
        )
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let response = self
            .client
            .post(&url)
            .json(&SendMessage {
                chat_id,
                text,
                parse_mode: "Markdown",
            })
            .send()
            .await?;

        let body: TelegramResponse = response.json().await?;
        if !body.ok {
            return Err(NotifyError::Api {
                chat_id,
                description: body.description.unwrap_or_default(),
            });
        }

        debug!("Delivered message to chat {}", chat_id);
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, audience: Audience, text: &str) -> Result<(), NotifyError> {
        match audience {
            Audience::User(chat_id) => self.send_message(chat_id, text).await,
            Audience::Admins => {
                let mut first_error = None;
                for chat_id in &self.admin_chat_ids {
                    if let Err(e) = self.send_message(*chat_id, text).await {
                        warn!("Failed to notify admin chat {}: {}", chat_id, e);
                        first_error.get_or_insert(e);
                    }
                }
                first_error.map_or(Ok(()), Err)
            }
        }
    }
}
