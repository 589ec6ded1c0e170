//! Minimal Telegram Bot API client.
//!
//! Only the three calls the bot needs are wrapped: `getUpdates` (long poll),
//! `sendMessage` (with an optional one-time reply keyboard) and `getFile`
//! followed by the file download. Every method is a JSON `POST` to
//! `{api_base_url}/bot{token}/{method}`; files come from
//! `{api_base_url}/file/bot{token}/{file_path}`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::BotConfig;
use crate::pipeline::{ConversationId, Reply};

// ---------------------------------------------------------------------------
// BotError
// ---------------------------------------------------------------------------

/// Errors from the chat transport.
#[derive(Debug, Error)]
pub enum BotError {
    /// HTTP transport or connection error.
    #[error("bot API request failed: {0}")]
    Request(String),

    /// The request did not complete within the client timeout.
    #[error("bot API request timed out")]
    Timeout,

    /// The API answered `ok: false`.
    #[error("bot API error {code}: {description}")]
    Api { code: i64, description: String },

    /// The response body was not the expected JSON.
    #[error("failed to parse bot API response: {0}")]
    Parse(String),

    /// `getFile` returned no downloadable path (file too large or expired).
    #[error("file {0} has no download path")]
    MissingFilePath(String),

    /// Writing the downloaded file failed.
    #[error("could not store download: {0}")]
    Io(String),
}

impl From<reqwest::Error> for BotError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BotError::Timeout
        } else {
            // The URL embeds the bot token.
            BotError::Request(e.without_url().to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T, BotError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            (true, None) => Err(BotError::Parse("ok response without result".into())),
            (false, _) => Err(BotError::Api {
                code: self.error_code.unwrap_or_default(),
                description: self.description.unwrap_or_default(),
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub audio: Option<FileRef>,
    #[serde(default)]
    pub voice: Option<FileRef>,
    #[serde(default)]
    pub document: Option<FileRef>,
}

impl Message {
    pub fn conversation(&self) -> ConversationId {
        ConversationId(self.chat.id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Attachment reference as it appears inside a message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileRef {
    pub file_id: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

/// `getFile` result.
#[derive(Debug, Clone, Deserialize)]
pub struct File {
    pub file_id: String,
    #[serde(default)]
    pub file_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct GetUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: &'static [&'static str],
}

#[derive(Debug, Serialize)]
struct GetFile<'a> {
    file_id: &'a str,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<ReplyKeyboard>,
}

#[derive(Debug, Serialize)]
struct ReplyKeyboard {
    keyboard: Vec<Vec<KeyboardButton>>,
    one_time_keyboard: bool,
    resize_keyboard: bool,
}

#[derive(Debug, Serialize)]
struct KeyboardButton {
    text: String,
}

impl ReplyKeyboard {
    /// All labels on a single row.
    fn single_row(labels: &[String]) -> Self {
        Self {
            keyboard: vec![labels
                .iter()
                .map(|text| KeyboardButton { text: text.clone() })
                .collect()],
            one_time_keyboard: true,
            resize_keyboard: true,
        }
    }
}

// ---------------------------------------------------------------------------
// ChatTransport trait
// ---------------------------------------------------------------------------

/// What the dispatcher needs from a chat service.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Long-poll for updates with `update_id >= offset`.
    async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, BotError>;

    async fn send_reply(&self, conversation: ConversationId, reply: &Reply) -> Result<(), BotError>;

    /// Download an attachment into `dir`, returning the local path.
    async fn fetch_audio(&self, file: &FileRef, dir: &Path) -> Result<PathBuf, BotError>;
}

// ---------------------------------------------------------------------------
// BotApi
// ---------------------------------------------------------------------------

pub struct BotApi {
    client: reqwest::Client,
    api_url: String,
    file_url: String,
    long_poll_secs: u64,
}

impl BotApi {
    /// Build the client. The HTTP timeout leaves headroom over the long-poll
    /// window so an idle `getUpdates` is not cut short.
    pub fn from_config(config: &BotConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.long_poll_secs + 15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let base = config.api_base_url.trim().trim_end_matches('/');
        let token = config.token.trim();

        Self {
            client,
            api_url: format!("{base}/bot{token}"),
            file_url: format!("{base}/file/bot{token}"),
            long_poll_secs: config.long_poll_secs,
        }
    }

    async fn call<P, T>(&self, method: &str, params: &P) -> Result<T, BotError>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/{method}", self.api_url);
        let response = self.client.post(&url).json(params).send().await?;

        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| BotError::Parse(format!("{method}: {}", e.without_url())))?;
        body.into_result()
    }

    pub async fn get_file(&self, file_id: &str) -> Result<File, BotError> {
        self.call("getFile", &GetFile { file_id }).await
    }
}

#[async_trait]
impl ChatTransport for BotApi {
    async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, BotError> {
        let params = GetUpdates {
            offset,
            timeout: self.long_poll_secs,
            allowed_updates: &["message"],
        };
        self.call("getUpdates", &params).await
    }

    async fn send_reply(&self, conversation: ConversationId, reply: &Reply) -> Result<(), BotError> {
        let params = SendMessage {
            chat_id: conversation.0,
            text: &reply.text,
            reply_markup: reply.keyboard.as_deref().map(ReplyKeyboard::single_row),
        };
        let _sent: serde_json::Value = self.call("sendMessage", &params).await?;
        Ok(())
    }

    async fn fetch_audio(&self, file: &FileRef, dir: &Path) -> Result<PathBuf, BotError> {
        let remote = self.get_file(&file.file_id).await?;
        let remote_path = remote
            .file_path
            .ok_or_else(|| BotError::MissingFilePath(file.file_id.clone()))?;

        let url = format!("{}/{remote_path}", self.file_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(BotError::Api {
                code: i64::from(response.status().as_u16()),
                description: format!("download of {} failed", file.file_id),
            });
        }
        let bytes = response.bytes().await?;

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| BotError::Io(format!("{}: {e}", dir.display())))?;
        let local = dir.join(local_file_name(file, &remote_path));
        tokio::fs::write(&local, &bytes)
            .await
            .map_err(|e| BotError::Io(format!("{}: {e}", local.display())))?;

        log::debug!("bot: downloaded {} ({} bytes)", local.display(), bytes.len());
        Ok(local)
    }
}

/// `{file_id}.{ext}`, the extension taken from the server path, then the
/// original file name, then the MIME type.
pub fn local_file_name(file: &FileRef, remote_path: &str) -> String {
    let ext = extension_of(remote_path)
        .or_else(|| file.file_name.as_deref().and_then(extension_of))
        .or_else(|| file.mime_type.as_deref().and_then(extension_for_mime))
        .unwrap_or("ogg");
    let stem: String = file
        .file_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{stem}.{}", ext.to_ascii_lowercase())
}

fn extension_of(name: &str) -> Option<&str> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
}

fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "audio/ogg" | "audio/opus" => Some("ogg"),
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/wav" | "audio/x-wav" | "audio/wave" => Some("wav"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => Some("m4a"),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_embed_the_token() {
        let api = BotApi::from_config(&BotConfig {
            token: "123:abc".into(),
            api_base_url: "https://api.telegram.org/".into(),
            ..BotConfig::default()
        });
        assert_eq!(api.api_url, "https://api.telegram.org/bot123:abc");
        assert_eq!(api.file_url, "https://api.telegram.org/file/bot123:abc");
    }

    #[test]
    fn updates_parse_from_api_json() {
        let json = r#"{
            "ok": true,
            "result": [
                {"update_id": 10, "message": {"message_id": 1, "chat": {"id": 5, "type": "private"},
                  "voice": {"file_id": "AwAD", "file_unique_id": "u", "duration": 3, "mime_type": "audio/ogg"}}},
                {"update_id": 11, "edited_message": {"message_id": 2, "chat": {"id": 5}}}
            ]
        }"#;
        let parsed: ApiResponse<Vec<Update>> = serde_json::from_str(json).unwrap();
        let updates = parsed.into_result().unwrap();

        assert_eq!(updates.len(), 2);
        let msg = updates[0].message.as_ref().unwrap();
        assert_eq!(msg.conversation(), ConversationId(5));
        assert_eq!(msg.voice.as_ref().unwrap().file_id, "AwAD");
        assert!(updates[1].message.is_none());
    }

    #[test]
    fn api_errors_carry_code_and_description() {
        let json = r#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#;
        let parsed: ApiResponse<Vec<Update>> = serde_json::from_str(json).unwrap();
        match parsed.into_result() {
            Err(BotError::Api { code, description }) => {
                assert_eq!(code, 401);
                assert_eq!(description, "Unauthorized");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn send_message_serialises_one_time_keyboard() {
        let labels = vec!["Transcribe".to_string(), "Translate".to_string()];
        let msg = SendMessage {
            chat_id: 5,
            text: "pick",
            reply_markup: Some(ReplyKeyboard::single_row(&labels)),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            serde_json::json!({
                "chat_id": 5,
                "text": "pick",
                "reply_markup": {
                    "keyboard": [[{"text": "Transcribe"}, {"text": "Translate"}]],
                    "one_time_keyboard": true,
                    "resize_keyboard": true
                }
            })
        );

        let plain = SendMessage {
            chat_id: 5,
            text: "hi",
            reply_markup: None,
        };
        assert!(serde_json::to_value(&plain).unwrap().get("reply_markup").is_none());
    }

    #[test]
    fn local_name_prefers_server_extension() {
        let file = FileRef {
            file_id: "AwAD/x".into(),
            mime_type: Some("audio/mpeg".into()),
            file_name: Some("talk.MP3".into()),
        };
        assert_eq!(local_file_name(&file, "voice/file_7.oga"), "AwAD_x.oga");
        assert_eq!(local_file_name(&file, "voice/file_7"), "AwAD_x.mp3");

        let bare = FileRef {
            file_id: "id".into(),
            ..FileRef::default()
        };
        assert_eq!(local_file_name(&bare, "x"), "id.ogg");
    }
}
