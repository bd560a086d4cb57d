//! Outbound Telegram Bot API calls.

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

const API_BASE: &str = "https://api.telegram.org";

/// Where notifications and screenshots go.
#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn send_message(&self, chat_id: i64, html: &str) -> anyhow::Result<()>;

    /// Send a PNG and return the id of the posted message.
    async fn send_photo(&self, chat_id: i64, png: Vec<u8>, caption: &str) -> anyhow::Result<i64>;

    async fn pin_message(&self, chat_id: i64, message_id: i64) -> anyhow::Result<()>;
}

// ── Bot API client ──

pub struct TelegramClient {
    api_base: String,
    bot_token: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct ApiReply<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct SentMessage {
    message_id: i64,
}

impl TelegramClient {
    pub fn new(bot_token: String) -> Self {
        Self::with_api_base(API_BASE, bot_token)
    }

    /// Client for a Bot API server other than api.telegram.org.
    pub fn with_api_base(api_base: &str, bot_token: String) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token,
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        request: reqwest::RequestBuilder,
    ) -> anyhow::Result<T> {
        let reply: ApiReply<T> = request
            .send()
            .await
            .with_context(|| format!("{method}: request failed"))?
            .json()
            .await
            .with_context(|| format!("{method}: unreadable reply"))?;

        if !reply.ok {
            bail!(
                "{method}: {}",
                reply.description.unwrap_or_else(|| "unknown error".into())
            );
        }
        reply
            .result
            .with_context(|| format!("{method}: reply without result"))
    }
}

#[async_trait]
impl ChatSender for TelegramClient {
    async fn send_message(&self, chat_id: i64, html: &str) -> anyhow::Result<()> {
        let request = self.http.post(self.url("sendMessage")).json(&serde_json::json!({
            "chat_id": chat_id,
            "text": html,
            "parse_mode": "HTML"
        }));
        self.call::<serde_json::Value>("sendMessage", request).await?;
        Ok(())
    }

    async fn send_photo(&self, chat_id: i64, png: Vec<u8>, caption: &str) -> anyhow::Result<i64> {
        let photo = reqwest::multipart::Part::bytes(png)
            .file_name("schedule.png")
            .mime_str("image/png")?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .text("parse_mode", "HTML")
            .part("photo", photo);

        let request = self.http.post(self.url("sendPhoto")).multipart(form);
        let sent: SentMessage = self.call("sendPhoto", request).await?;
        Ok(sent.message_id)
    }

    async fn pin_message(&self, chat_id: i64, message_id: i64) -> anyhow::Result<()> {
        let request = self.http.post(self.url("pinChatMessage")).json(&serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "disable_notification": true
        }));
        self.call::<bool>("pinChatMessage", request).await?;
        Ok(())
    }
}

// ── Table → chat routing ──

/// Chat group of each table.
#[derive(Debug, Clone, Default)]
pub struct ChatRoutes {
    chats: HashMap<String, i64>,
}

impl ChatRoutes {
    /// Parse `table=chat_id` pairs separated by commas, e.g.
    /// `111=-1002168406968,⚽️=-1002468561827`.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let mut chats = HashMap::new();
        for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (table, chat) = pair
                .split_once('=')
                .with_context(|| format!("expected table=chat_id, got {pair:?}"))?;
            let chat: i64 = chat
                .trim()
                .parse()
                .with_context(|| format!("chat id for table {table:?} must be a number"))?;
            chats.insert(table.trim().to_string(), chat);
        }
        Ok(Self { chats })
    }

    pub fn chat_for(&self, table: &str) -> Option<i64> {
        self.chats.get(table).copied()
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }
}
