//! Configuration module for the voice scribe bot.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each subsystem,
//! `AppPaths` for cross-platform data directories, and TOML persistence via
//! `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, BotConfig, CaptionFormat, ConversationConfig, PollConfig, RemoteSttConfig,
    SttBackend, SttConfig, TranslateConfig, BOT_TOKEN_ENV,
};
