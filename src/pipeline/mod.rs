//! Conversation pipeline: state machine, flows and error taxonomy.
//!
//! # Architecture
//!
//! ```text
//! Dispatcher (bot)
//!        │ audio / text per conversation
//!        ▼
//! PipelineOrchestrator
//!        │
//!        ├─ ConversationStore::on_audio  → prompt with action keyboard
//!        │
//!        └─ ConversationStore::on_text
//!              ├─ Transcribe(audio)        → TranscriptionEngine → joined lines
//!              ├─ Translate(audio, target) → TranscriptionEngine → Translator per segment
//!              └─ prompt / fallback / "send audio first"
//!
//! sweeper task ──▶ PipelineOrchestrator::sweep_expired ──▶ expiry notices
//! ```

pub mod error;
pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use error::{ErrorClass, PipelineError, FALLBACK, GENERIC_FAILURE, SEND_AUDIO_FIRST};
pub use runner::{PipelineOrchestrator, Reply, EXPIRED, PROMPT_ACTION, PROMPT_LANGUAGE};
pub use state::{
    Action, ActionLabels, AudioItem, ConversationId, ConversationState, ConversationStore,
    PendingRequest, Step,
};
