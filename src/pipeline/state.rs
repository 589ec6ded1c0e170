//! Per-conversation state machine and the keyed request store.
//!
//! Each conversation holds at most one [`PendingRequest`]. The transitions are:
//!
//! ```text
//! any state ──audio──▶ AwaitingAction
//! AwaitingAction ──"Transcribe"──▶ (transcribe flow) ──▶ Idle
//!                ──"Translate"───▶ AwaitingTargetLanguage
//!                ──other text────▶ AwaitingAction  (fallback reply)
//! AwaitingTargetLanguage ──valid code───▶ (translate flow) ──▶ Idle
//!                        ──unknown code─▶ AwaitingTargetLanguage
//! Idle ──text──▶ Idle  ("send audio first")
//! ```
//!
//! Every mutation pushes `expires_at` forward by the inactivity timeout; the
//! dispatcher calls [`ConversationStore::sweep_expired`] periodically.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::config::BotConfig;

// ---------------------------------------------------------------------------
// Identity and payload types
// ---------------------------------------------------------------------------

/// Chat identity as assigned by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationId(pub i64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An uploaded audio file waiting for an action.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioItem {
    /// Transport file id.
    pub id: String,
    /// Where the download landed.
    pub path: PathBuf,
    pub received_at: DateTime<Utc>,
}

impl AudioItem {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            received_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Transcribe,
    Translate,
}

// ---------------------------------------------------------------------------
// ConversationState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationState {
    /// No pending audio.
    #[default]
    Idle,
    /// Audio received; waiting for the user to pick an action.
    AwaitingAction,
    /// "Translate" picked; waiting for a target language code.
    AwaitingTargetLanguage,
}

impl ConversationState {
    pub fn label(&self) -> &'static str {
        match self {
            ConversationState::Idle => "idle",
            ConversationState::AwaitingAction => "awaiting-action",
            ConversationState::AwaitingTargetLanguage => "awaiting-target-language",
        }
    }
}

/// The single in-flight request of one conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    pub audio: AudioItem,
    pub action: Option<Action>,
    pub target_language: Option<String>,
    pub state: ConversationState,
    pub expires_at: Instant,
}

impl PendingRequest {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

// ---------------------------------------------------------------------------
// ActionLabels
// ---------------------------------------------------------------------------

/// The reply-keyboard labels the user picks an action with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionLabels {
    pub transcribe: String,
    pub translate: String,
}

impl ActionLabels {
    /// Match trimmed `text` against the labels, case-sensitively.
    pub fn parse(&self, text: &str) -> Option<Action> {
        let text = text.trim();
        if text == self.transcribe.trim() {
            Some(Action::Transcribe)
        } else if text == self.translate.trim() {
            Some(Action::Translate)
        } else {
            None
        }
    }

    /// Keyboard row shown with the action prompt.
    pub fn keyboard(&self) -> Vec<String> {
        vec![self.transcribe.clone(), self.translate.clone()]
    }
}

impl Default for ActionLabels {
    fn default() -> Self {
        Self::from(&BotConfig::default())
    }
}

impl From<&BotConfig> for ActionLabels {
    fn from(cfg: &BotConfig) -> Self {
        Self {
            transcribe: cfg.transcribe_label.clone(),
            translate: cfg.translate_label.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// What the orchestrator must do after a text message was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Ask for a target language code.
    PromptTargetLanguage,
    /// Run the transcribe flow. The request has left the store.
    Transcribe(AudioItem),
    /// Run the translate flow into the given tag. The request has left the store.
    Translate(AudioItem, String),
    /// Text did not match an action label; state unchanged.
    Unrecognized(String),
    /// Target code rejected; still awaiting a language.
    InvalidLanguage(String),
    /// The pending request had expired; it has left the store and its audio
    /// must be discarded. Reads as [`Step::NoPendingAudio`] to the user.
    Expired(AudioItem),
    /// Nothing pending for this conversation.
    NoPendingAudio,
}

// ---------------------------------------------------------------------------
// ConversationStore
// ---------------------------------------------------------------------------

/// Keyed map of pending requests, one per conversation.
///
/// Critical sections are short and synchronous; callers never hold the lock
/// across an `.await`.
pub struct ConversationStore {
    pending: Mutex<HashMap<ConversationId, PendingRequest>>,
    ttl: Duration,
}

impl ConversationStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ConversationId, PendingRequest>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register new audio, replacing whatever was pending.
    ///
    /// Returns the replaced audio so its file can be discarded.
    pub fn on_audio(
        &self,
        conversation: ConversationId,
        audio: AudioItem,
        now: Instant,
    ) -> Option<AudioItem> {
        let request = PendingRequest {
            audio,
            action: None,
            target_language: None,
            state: ConversationState::AwaitingAction,
            expires_at: now + self.ttl,
        };
        self.lock()
            .insert(conversation, request)
            .map(|previous| previous.audio)
    }

    /// Apply a text message and decide the next step.
    ///
    /// `is_supported` validates a target language code before the request
    /// leaves the store.
    pub fn on_text<F>(
        &self,
        conversation: ConversationId,
        text: &str,
        labels: &ActionLabels,
        now: Instant,
        is_supported: F,
    ) -> Step
    where
        F: FnOnce(&str) -> bool,
    {
        let mut pending = self.lock();

        let expired = match pending.get(&conversation) {
            None => return Step::NoPendingAudio,
            Some(request) => request.is_expired(now),
        };
        if expired {
            return match pending.remove(&conversation) {
                Some(request) => Step::Expired(request.audio),
                None => Step::NoPendingAudio,
            };
        }

        let Some(request) = pending.get_mut(&conversation) else {
            return Step::NoPendingAudio;
        };

        let state = request.state;
        match state {
            ConversationState::Idle => Step::NoPendingAudio,
            ConversationState::AwaitingAction => match labels.parse(text) {
                Some(Action::Transcribe) => match pending.remove(&conversation) {
                    Some(request) => Step::Transcribe(request.audio),
                    None => Step::NoPendingAudio,
                },
                Some(Action::Translate) => {
                    request.action = Some(Action::Translate);
                    request.state = ConversationState::AwaitingTargetLanguage;
                    request.expires_at = now + self.ttl;
                    Step::PromptTargetLanguage
                }
                None => {
                    request.expires_at = now + self.ttl;
                    Step::Unrecognized(text.trim().to_string())
                }
            },
            ConversationState::AwaitingTargetLanguage => {
                let code = text.trim().to_string();
                if !is_supported(&code) {
                    request.expires_at = now + self.ttl;
                    return Step::InvalidLanguage(code);
                }
                match pending.remove(&conversation) {
                    Some(request) => Step::Translate(request.audio, code),
                    None => Step::NoPendingAudio,
                }
            }
        }
    }

    /// Current state of `conversation`; expired requests read as `Idle`.
    pub fn state(&self, conversation: ConversationId, now: Instant) -> ConversationState {
        match self.lock().get(&conversation) {
            Some(request) if !request.is_expired(now) => request.state,
            _ => ConversationState::Idle,
        }
    }

    /// Snapshot of the pending request, if any.
    pub fn get(&self, conversation: ConversationId) -> Option<PendingRequest> {
        self.lock().get(&conversation).cloned()
    }

    /// Drop every request whose deadline has passed.
    pub fn sweep_expired(&self, now: Instant) -> Vec<(ConversationId, AudioItem)> {
        let mut pending = self.lock();
        let expired: Vec<ConversationId> = pending
            .iter()
            .filter(|(_, request)| request.is_expired(now))
            .map(|(id, _)| *id)
            .collect();

        expired
            .into_iter()
            .filter_map(|id| pending.remove(&id).map(|request| (id, request.audio)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
