//! Telegram Bot API adapter.
//!
//! Long-polls `getUpdates` for new messages, resolves and downloads files,
//! and sends plain text replies (transcripts and operator notifications).

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::MessageSource;
use crate::domain::{FileMeta, FileRef, Message, MessageContent, Update};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Extra time on top of the long-poll timeout before the HTTP request gives up
const REQUEST_GRACE: Duration = Duration::from_secs(15);

/// Telegram Bot API client
pub struct TelegramClient {
    /// Bot token
    bot_token: String,
    /// Maximum updates per poll
    batch_limit: u32,
    /// Server-side long-poll timeout
    long_poll_timeout: Duration,
    /// Base URL, overridable for local Bot API servers
    api_base: String,
    /// HTTP client
    client: reqwest::Client,
}

/// Response envelope from Telegram API
#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// Configuration for Telegram client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub batch_limit: u32,
    pub long_poll_timeout_secs: u64,
}

// ============================================================================
// Wire types (subset of the Bot API we read)
// ============================================================================

#[derive(Debug, Deserialize)]
struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgFile {
    file_id: String,
    file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TgNamedFile {
    file_id: String,
    file_size: Option<u64>,
    file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgVoice {
    file_id: String,
    file_size: Option<u64>,
    #[serde(default)]
    duration: u32,
}

#[derive(Debug, Deserialize)]
struct TgSticker {
    emoji: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgLocation {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct TgPoll {
    question: String,
}

#[derive(Debug, Deserialize)]
struct TgContact {
    first_name: String,
    last_name: Option<String>,
    phone_number: String,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    date: i64,
    chat: TgChat,
    text: Option<String>,
    caption: Option<String>,
    photo: Option<Vec<TgFile>>,
    video: Option<TgFile>,
    document: Option<TgNamedFile>,
    audio: Option<TgNamedFile>,
    voice: Option<TgVoice>,
    sticker: Option<TgSticker>,
    animation: Option<TgFile>,
    location: Option<TgLocation>,
    poll: Option<TgPoll>,
    contact: Option<TgContact>,
    reply_to_message: Option<Box<TgMessage>>,
}

#[derive(Debug, Deserialize)]
struct TgFileInfo {
    file_id: String,
    file_path: Option<String>,
    file_size: Option<u64>,
}

impl From<TgFile> for FileRef {
    fn from(file: TgFile) -> Self {
        Self {
            file_id: file.file_id,
            file_size: file.file_size,
        }
    }
}

impl TgMessage {
    fn into_content(self) -> MessageContent {
        let named = |file: TgNamedFile| {
            (
                FileRef {
                    file_id: file.file_id,
                    file_size: file.file_size,
                },
                file.file_name,
            )
        };

        // Animations also carry a `document` field, so they are matched first
        if self.animation.is_some() {
            MessageContent::Animation
        } else if let Some(text) = self.text {
            MessageContent::Text { text }
        } else if let Some(sizes) = self.photo {
            MessageContent::Photo {
                sizes: sizes.into_iter().map(FileRef::from).collect(),
            }
        } else if let Some(video) = self.video {
            MessageContent::Video { file: video.into() }
        } else if let Some(document) = self.document {
            let (file, file_name) = named(document);
            MessageContent::Document { file, file_name }
        } else if let Some(audio) = self.audio {
            let (file, file_name) = named(audio);
            MessageContent::Audio { file, file_name }
        } else if let Some(voice) = self.voice {
            MessageContent::Voice {
                file: FileRef {
                    file_id: voice.file_id,
                    file_size: voice.file_size,
                },
                duration_secs: voice.duration,
            }
        } else if let Some(sticker) = self.sticker {
            MessageContent::Sticker {
                emoji: sticker.emoji,
            }
        } else if let Some(location) = self.location {
            MessageContent::Location {
                latitude: location.latitude,
                longitude: location.longitude,
            }
        } else if let Some(poll) = self.poll {
            MessageContent::Poll {
                question: poll.question,
            }
        } else if let Some(contact) = self.contact {
            MessageContent::Contact {
                first_name: contact.first_name,
                last_name: contact.last_name,
                phone_number: contact.phone_number,
            }
        } else {
            MessageContent::Other
        }
    }
}

impl From<TgMessage> for Message {
    fn from(mut raw: TgMessage) -> Self {
        let reply_to = raw
            .reply_to_message
            .take()
            .map(|reply| Box::new(Message::from(*reply)));
        let id = raw.message_id;
        let chat_id = raw.chat.id;
        let caption = raw.caption.take();
        let timestamp = Utc
            .timestamp_opt(raw.date, 0)
            .single()
            .unwrap_or_else(Utc::now);

        Self {
            id,
            timestamp,
            chat_id,
            content: raw.into_content(),
            caption,
            reply_to,
        }
    }
}

/// Convert one raw update, degrading to a message-less update when the
/// payload cannot be parsed so the cursor can still move past it
fn parse_update(value: serde_json::Value) -> Option<Update> {
    let update_id = value.get("update_id").and_then(|v| v.as_i64())?;

    match serde_json::from_value::<TgUpdate>(value) {
        Ok(update) => Some(Update {
            id: update.update_id,
            message: update.message.map(Message::from),
        }),
        Err(e) => {
            tracing::warn!(update_id, error = %e, "Skipping malformed update payload");
            Some(Update {
                id: update_id,
                message: None,
            })
        }
    }
}

impl TelegramClient {
    /// Create a new Telegram client
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            batch_limit: 100,
            long_poll_timeout: Duration::from_secs(10),
            api_base: DEFAULT_API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Create from config
    pub fn from_config(config: TelegramConfig) -> Self {
        Self::new(config.bot_token)
            .with_polling(config.batch_limit, Duration::from_secs(config.long_poll_timeout_secs))
    }

    /// Override batch size and long-poll timeout
    pub fn with_polling(mut self, batch_limit: u32, long_poll_timeout: Duration) -> Self {
        self.batch_limit = batch_limit.clamp(1, 100);
        self.long_poll_timeout = long_poll_timeout;
        self
    }

    /// Point the client at a different Bot API server
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Build API URL
    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    /// Build file download URL
    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base, self.bot_token, file_path)
    }

    /// Call a Bot API method and unwrap the response envelope
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<T> {
        let response = self
            .client
            .post(self.api_url(method))
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Failed to call Telegram {}", method))?;

        let result: TelegramResponse<T> = response
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Failed to parse Telegram {} response", method))?;

        if !result.ok {
            anyhow::bail!(
                "Telegram API error in {}: {}",
                method,
                result.description.unwrap_or_default()
            );
        }

        result
            .result
            .with_context(|| format!("Telegram {} returned no result", method))
    }
}

#[async_trait]
impl MessageSource for TelegramClient {
    async fn fetch_updates(&self, offset: i64) -> Result<Vec<Update>> {
        tracing::debug!(offset, "Fetching updates");

        let raw: Vec<serde_json::Value> = self
            .call(
                "getUpdates",
                serde_json::json!({
                    "offset": offset,
                    "limit": self.batch_limit,
                    "timeout": self.long_poll_timeout.as_secs(),
                    "allowed_updates": ["message"],
                }),
                self.long_poll_timeout + REQUEST_GRACE,
            )
            .await?;

        let updates: Vec<Update> = raw.into_iter().filter_map(parse_update).collect();
        if !updates.is_empty() {
            tracing::info!(count = updates.len(), "Received updates");
        }
        Ok(updates)
    }

    async fn get_file_meta(&self, file_id: &str) -> Result<Option<FileMeta>> {
        let info: TgFileInfo = self
            .call(
                "getFile",
                serde_json::json!({ "file_id": file_id }),
                REQUEST_GRACE,
            )
            .await?;

        tracing::debug!(file_id, file_path = ?info.file_path, "Resolved file metadata");

        Ok(Some(FileMeta {
            file_id: info.file_id,
            file_path: info.file_path,
            file_size: info.file_size,
        }))
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let meta = self
            .get_file_meta(file_id)
            .await?
            .with_context(|| format!("No metadata for file {}", file_id))?;
        let file_path = meta
            .file_path
            .with_context(|| format!("Telegram returned no download path for file {}", file_id))?;

        let response = self
            .client
            .get(self.file_url(&file_path))
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Failed to download Telegram file")?
            .error_for_status()
            .map_err(reqwest::Error::without_url)
            .context("Telegram file download was rejected")?;

        let bytes = response
            .bytes()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Failed to read Telegram file body")?;

        tracing::info!(file_id, size = bytes.len(), "Downloaded file");
        Ok(bytes.to_vec())
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "sendMessage",
                serde_json::json!({
                    "chat_id": chat_id,
                    "text": text,
                }),
                REQUEST_GRACE,
            )
            .await?;

        let preview: String = text.chars().take(50).collect();
        tracing::info!(chat_id, %preview, "Sent message");
        Ok(())
    }
}
