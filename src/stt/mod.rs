//! STT (speech-to-text) engines and the segment store.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────── TranscriptionEngine (trait) ─────────────────────────┐
//! │                                                                              │
//! │  WhisperEngine (local)                 RemoteSttEngine (HTTP)                │
//! │  decode → resample → whisper.cpp       submit ─▶ JobPoller ─▶ parse_captions │
//! │               │                                        │                     │
//! │               └──────────────▶ Transcript ◀────────────┘                     │
//! └──────────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod captions;
pub mod engine;
pub mod poller;
pub mod remote;
pub mod transcript;
#[cfg(feature = "whisper")]
pub mod whisper;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use captions::{parse_captions, CaptionError};
pub use engine::{SttError, TranscriptionEngine};
pub use poller::{
    JobId, JobPoller, JobStatus, JobStatusSource, PollError, PollOutcome, PollPolicy,
    StatusReport,
};
pub use remote::RemoteSttEngine;
pub use transcript::{Segment, Transcript};
#[cfg(feature = "whisper")]
pub use whisper::{SamplingStrategy, TranscribeParams, WhisperEngine};

#[cfg(test)]
pub use engine::MockEngine;
