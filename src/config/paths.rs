//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\voice-scribe-bot\
//!   macOS:   ~/Library/Application Support/voice-scribe-bot/
//!   Linux:   ~/.config/voice-scribe-bot/
//!
//! Data dir (models, downloaded audio):
//!   Windows: %LOCALAPPDATA%\voice-scribe-bot\
//!   macOS:   ~/Library/Application Support/voice-scribe-bot/
//!   Linux:   ~/.local/share/voice-scribe-bot/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory for the Whisper GGML model and the NLLB tokenizer.
    pub models_dir: PathBuf,
    /// Directory that downloaded audio messages are written to.
    pub audio_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "voice-scribe-bot";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        Self {
            settings_file: config_dir.join("settings.toml"),
            config_dir,
            models_dir: data_dir.join("models"),
            audio_dir: data_dir.join("audio_files"),
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
