use std::{sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use log::{debug, error, info};
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    history::CheckHistory,
    notifier::{Notification, NotificationSink, Outbox},
};

const API_BASE_URL: &str = "https://api.telegram.org";
const LONG_POLL_SECS: u64 = 30;
const RETRY_PAUSE: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Chat {
    pub id: i64,
}

/// Minimal Bot API client: `sendMessage` and long-poll `getUpdates`.
pub struct TelegramClient {
    client: Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(client: Client, api_key: &str) -> Self {
        Self::with_base_url(client, API_BASE_URL, api_key)
    }

    pub fn with_base_url(client: Client, api_base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: format!("{api_base_url}/bot{api_key}"),
        }
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
        self.call::<serde_json::Value>(
            "sendMessage",
            json!({ "chat_id": chat_id, "text": text }),
            None,
        )
        .await?;
        Ok(())
    }

    pub async fn get_updates(&self, offset: Option<i64>) -> anyhow::Result<Vec<Update>> {
        // The HTTP timeout has to outlive the long poll.
        let timeout = Duration::from_secs(LONG_POLL_SECS + 10);
        let mut body = json!({ "timeout": LONG_POLL_SECS });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        self.call("getUpdates", body, Some(timeout)).await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
        timeout: Option<Duration>,
    ) -> anyhow::Result<T> {
        let mut request = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .json(&body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response: ApiResponse<T> = request
            .send()
            .await
            .with_context(|| format!("failed to call telegram {method}"))?
            .json()
            .await
            .with_context(|| format!("failed to read telegram {method} response"))?;
        unwrap_response(method, response)
    }
}

fn unwrap_response<T>(method: &str, response: ApiResponse<T>) -> anyhow::Result<T> {
    match response {
        ApiResponse {
            ok: true,
            result: Some(result),
            ..
        } => Ok(result),
        ApiResponse {
            description,
            error_code,
            ..
        } => Err(anyhow::anyhow!(
            "telegram {method} failed with error_code {} {}",
            error_code.unwrap_or_default(),
            description.unwrap_or_default()
        )),
    }
}

#[async_trait]
impl NotificationSink for TelegramClient {
    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
        self.send_message(notification.chat_id, &notification.text)
            .await
    }
}

/// Answer to an incoming chat message.
pub fn reply_for(text: &str, chat_id: i64, history: &CheckHistory) -> String {
    // "/log@some_bot" in group chats.
    let command = text.trim().split('@').next().unwrap_or_default();
    match command {
        "/start" => format!("Bot started. Your chat_id is {chat_id}"),
        "/log" => history.summary(),
        "/ping" => format!("Pong. Your chat_id is {chat_id}"),
        _ => "Unsupported message. Supported only: /start, /log, /ping".to_string(),
    }
}

/// Answers chat commands. Replies go through the delivery lane.
pub struct TelegramBot {
    client: Arc<TelegramClient>,
    history: Arc<Mutex<CheckHistory>>,
    outbox: Outbox,
}

impl TelegramBot {
    pub fn new(client: Arc<TelegramClient>, history: Arc<Mutex<CheckHistory>>, outbox: Outbox) -> Self {
        Self {
            client,
            history,
            outbox,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut offset = None;
        loop {
            debug!("Polling telegram updates from offset {offset:?}");
            let polled = tokio::select! {
                _ = cancel.cancelled() => break,
                polled = self.client.get_updates(offset) => polled,
            };
            let updates = match polled {
                Ok(updates) => updates,
                Err(err) => {
                    error!("Failed to poll telegram updates: {err:#}");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RETRY_PAUSE) => continue,
                    }
                }
            };

            for update in &updates {
                self.answer(update).await;
            }
            if let Some(last) = updates.last() {
                offset = Some(last.update_id + 1);
            }
        }
        info!("Telegram bot stopped");
    }

    async fn answer(&self, update: &Update) {
        let Some(message) = &update.message else {
            return;
        };
        let Some(text) = &message.text else {
            return;
        };
        info!("Got '{text}' from chat {}", message.chat.id);
        let reply = reply_for(text, message.chat.id, &*self.history.lock().await);
        self.outbox.post(message.chat.id, reply);
    }
}
