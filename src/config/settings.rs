//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

/// Environment variable that overrides [`BotConfig::token`].
pub const BOT_TOKEN_ENV: &str = "BOT_TOKEN";

// ---------------------------------------------------------------------------
// SttBackend
// ---------------------------------------------------------------------------

/// Selects which engine turns audio into segments.
///
/// | Variant | Engine                                   | Needs               |
/// |---------|------------------------------------------|---------------------|
/// | Local   | whisper.cpp in-process                   | `whisper` feature   |
/// | Remote  | async HTTP service, polled to completion | `remote` base URL   |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SttBackend {
    Local,
    Remote,
}

impl Default for SttBackend {
    fn default() -> Self {
        Self::Local
    }
}

// ---------------------------------------------------------------------------
// CaptionFormat
// ---------------------------------------------------------------------------

/// Caption format requested from the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionFormat {
    Srt,
    Vtt,
}

impl CaptionFormat {
    /// Wire name sent in the `format` form field.
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptionFormat::Srt => "srt",
            CaptionFormat::Vtt => "vtt",
        }
    }
}

impl Default for CaptionFormat {
    fn default() -> Self {
        Self::Srt
    }
}

// ---------------------------------------------------------------------------
// BotConfig
// ---------------------------------------------------------------------------

/// Chat transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Telegram bot token. Overridden by the `BOT_TOKEN` environment variable.
    pub token: String,
    /// Bot API root, without the `/bot<token>` suffix.
    pub api_base_url: String,
    /// Seconds the server may hold a `getUpdates` long-poll open.
    pub long_poll_secs: u64,
    /// Reply-keyboard label that selects the transcribe flow.
    pub transcribe_label: String,
    /// Reply-keyboard label that selects the translate flow.
    pub translate_label: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base_url: "https://api.telegram.org".into(),
            long_poll_secs: 30,
            transcribe_label: "Transcribe".into(),
            translate_label: "Translate".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// SttConfig
// ---------------------------------------------------------------------------

/// Settings for the speech-recognition step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    /// Which engine to use.
    pub backend: SttBackend,
    /// GGML model file stem under the models directory (local backend).
    pub model: String,
    /// ISO-639-1 language code, or `"auto"` for Whisper's language detection.
    pub language: String,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            backend: SttBackend::default(),
            model: "ggml-medium".into(),
            language: "auto".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// RemoteSttConfig
// ---------------------------------------------------------------------------

/// Settings for the asynchronous remote transcription service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSttConfig {
    /// Service root, e.g. `http://localhost:8080/api/v1`.
    pub base_url: String,
    /// Bearer token: `None` for unauthenticated services.
    pub api_key: Option<String>,
    /// Recognition language sent with each job.
    pub language: String,
    /// Ask the service to restore punctuation.
    pub punctuation: bool,
    /// Caption format of the finished result.
    pub format: CaptionFormat,
    /// Per-request HTTP timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RemoteSttConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api/v1".into(),
            api_key: None,
            language: "en".into(),
            punctuation: true,
            format: CaptionFormat::default(),
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// PollConfig
// ---------------------------------------------------------------------------

/// Bounded polling policy for remote jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Delay before the second status query, in milliseconds.
    pub initial_delay_ms: u64,
    /// Multiplier applied to the delay after every non-terminal query.
    /// `1.0` gives a fixed interval.
    pub backoff_factor: f64,
    /// Upper bound for a single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Maximum number of status queries before giving up.
    pub max_attempts: u32,
    /// Maximum total wall time for one job, in seconds.
    pub max_elapsed_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            backoff_factor: 2.0,
            max_delay_ms: 30_000,
            max_attempts: 60,
            max_elapsed_secs: 900,
        }
    }
}

// ---------------------------------------------------------------------------
// TranslateConfig
// ---------------------------------------------------------------------------

/// Settings for the NLLB translation step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateConfig {
    /// FLORES-200 tag of the transcript language.
    pub source_language: String,
    /// File name of the subword tokenizer (`tokenizer.json`) under the models
    /// directory.
    pub tokenizer_file: String,
    /// Root URL of the CTranslate2 serving endpoint.
    pub base_url: String,
    /// Beam width used for decoding.
    pub beam_size: u32,
    /// Token ceiling for one decoding batch.
    pub max_batch_tokens: u32,
    /// Per-request HTTP timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            source_language: "eng_Latn".into(),
            tokenizer_file: "nllb-200-tokenizer.json".into(),
            base_url: "http://localhost:5000".into(),
            beam_size: 5,
            max_batch_tokens: 2024,
            timeout_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// ConversationConfig
// ---------------------------------------------------------------------------

/// Lifetime of a pending request waiting on user input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Seconds of inactivity after which a pending request is dropped.
    pub inactivity_timeout_secs: u64,
    /// How often the expiry sweep runs, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: 600,
            sweep_interval_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use voice_scribe_bot::config::AppConfig;
///
/// // Load (returns Default when file is missing) and apply BOT_TOKEN.
/// let config = AppConfig::load().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub stt: SttConfig,
    pub remote: RemoteSttConfig,
    pub poll: PollConfig,
    pub translate: TranslateConfig,
    pub conversation: ConversationConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml` and
    /// apply environment overrides.
    ///
    /// Returns the defaults when the file does not exist yet.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&AppPaths::new().settings_file)?;
        if let Ok(token) = std::env::var(BOT_TOKEN_ENV) {
            config.bot.token = token;
        }
        Ok(config)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
