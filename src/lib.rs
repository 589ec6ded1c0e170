//! Chat bot that transcribes uploaded audio and translates the transcript.
//!
//! * [`audio`]: decode and resample uploads to 16 kHz mono.
//! * [`stt`]: local Whisper and remote job-based transcription engines.
//! * [`translate`]: NLLB-200 translation per transcript segment.
//! * [`pipeline`]: per-conversation state machine and the two flows.
//! * [`bot`]: Telegram transport and dispatcher.
//! * [`config`]: `settings.toml` and platform paths.

pub mod audio;
pub mod bot;
pub mod config;
pub mod pipeline;
pub mod stt;
pub mod translate;
