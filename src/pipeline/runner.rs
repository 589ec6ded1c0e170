//! Pipeline orchestrator: conversation events in, replies out.
//!
//! [`PipelineOrchestrator`] applies each inbound event to the
//! [`ConversationStore`] and, when a request becomes actionable, runs one of
//! the two flows:
//!
//! ```text
//! Step::Transcribe(audio)
//!   └─▶ engine.transcribe ─▶ Transcript ─▶ "line\nline…"
//!
//! Step::Translate(audio, target)
//!   └─▶ supports(target)? ─▶ engine.transcribe ─▶ for each segment:
//!         translator.translate(text, source, target)
//!       ─▶ "Translation into {target}:\nline\nline…"
//! ```
//!
//! Failures are logged with their specific kind and collapsed into one
//! generic reply. The request has already left the store when a flow starts,
//! so a failure leaves the conversation `Idle`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::AppConfig;
use crate::stt::{Transcript, TranscriptionEngine};
use crate::translate::Translator;

use super::error::PipelineError;
use super::state::{ActionLabels, AudioItem, ConversationId, ConversationStore, Step};

/// Prompt sent with the action keyboard after an upload.
pub const PROMPT_ACTION: &str = "What should I do with this audio?";

/// Prompt sent after "Translate" was picked.
pub const PROMPT_LANGUAGE: &str =
    "Send the target language code, for example fra_Latn, deu_Latn or rus_Cyrl.";

/// Notification for a request dropped by the expiry sweep.
pub const EXPIRED: &str = "Your audio expired without an action. Send it again when you are ready.";

// ---------------------------------------------------------------------------
// Reply
// ---------------------------------------------------------------------------

/// Outbound message: plain text plus an optional one-time keyboard row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<Vec<String>>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(text: impl Into<String>, keyboard: Vec<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineOrchestrator
// ---------------------------------------------------------------------------

pub struct PipelineOrchestrator {
    store: ConversationStore,
    stt: Arc<dyn TranscriptionEngine>,
    translator: Arc<dyn Translator>,
    labels: ActionLabels,
    source_language: String,
}

impl PipelineOrchestrator {
    /// Create a new orchestrator.
    ///
    /// # Arguments
    ///
    /// * `store`          : keyed pending-request store.
    /// * `stt`            : transcription engine (local or remote).
    /// * `translator`     : translator used by the translate flow.
    /// * `labels`         : action keyboard labels.
    /// * `source_language`: tag of the spoken language, e.g. `eng_Latn`.
    pub fn new(
        store: ConversationStore,
        stt: Arc<dyn TranscriptionEngine>,
        translator: Arc<dyn Translator>,
        labels: ActionLabels,
        source_language: impl Into<String>,
    ) -> Self {
        Self {
            store,
            stt,
            translator,
            labels,
            source_language: source_language.into(),
        }
    }

    pub fn from_config(
        config: &AppConfig,
        stt: Arc<dyn TranscriptionEngine>,
        translator: Arc<dyn Translator>,
    ) -> Self {
        Self::new(
            ConversationStore::new(Duration::from_secs(
                config.conversation.inactivity_timeout_secs,
            )),
            stt,
            translator,
            ActionLabels::from(&config.bot),
            config.translate.source_language.clone(),
        )
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn labels(&self) -> &ActionLabels {
        &self.labels
    }

    // -----------------------------------------------------------------------
    // Event handlers
    // -----------------------------------------------------------------------

    /// New audio: replace any pending request and offer the actions.
    pub async fn handle_audio(&self, conversation: ConversationId, audio: AudioItem) -> Reply {
        log::info!("pipeline: conversation {conversation} uploaded {}", audio.id);
        let replaced = self.store.on_audio(conversation, audio, Instant::now());
        if let Some(previous) = replaced {
            log::debug!("pipeline: conversation {conversation} replaced {}", previous.id);
            discard_audio(&previous).await;
        }
        Reply::with_keyboard(PROMPT_ACTION, self.labels.keyboard())
    }

    /// Text reply: advance the state machine, running a flow if one is due.
    pub async fn handle_text(&self, conversation: ConversationId, text: &str) -> Reply {
        let step = self.store.on_text(
            conversation,
            text,
            &self.labels,
            Instant::now(),
            |code| self.translator.supports(code),
        );

        match step {
            Step::PromptTargetLanguage => Reply::text(PROMPT_LANGUAGE),
            Step::Transcribe(audio) => {
                let result = self.transcribe(&audio).await;
                discard_audio(&audio).await;
                self.finish(conversation, result)
            }
            Step::Translate(audio, target) => {
                let result = self.translate(&audio, &target).await;
                discard_audio(&audio).await;
                self.finish(conversation, result)
            }
            Step::Unrecognized(text) => Reply::with_keyboard(
                PipelineError::UnrecognizedAction(text).user_message(),
                self.labels.keyboard(),
            ),
            Step::InvalidLanguage(code) => {
                log::info!("pipeline: conversation {conversation} sent unsupported code {code:?}");
                Reply::text(PipelineError::UnsupportedLanguage(code).user_message())
            }
            Step::Expired(audio) => {
                log::info!(
                    "pipeline: conversation {conversation} replied after {} expired",
                    audio.id
                );
                discard_audio(&audio).await;
                Reply::text(PipelineError::NoPendingAudio.user_message())
            }
            Step::NoPendingAudio => Reply::text(PipelineError::NoPendingAudio.user_message()),
        }
    }

    // -----------------------------------------------------------------------
    // Flows
    // -----------------------------------------------------------------------

    /// Transcribe `audio`; one line per segment.
    pub async fn transcribe(&self, audio: &AudioItem) -> Result<String, PipelineError> {
        let transcript = self.recognise(audio).await?;
        Ok(transcript.joined())
    }

    /// Transcribe `audio` and translate each segment into `target`.
    ///
    /// The target is checked before any recognition work. A single failing
    /// segment fails the whole flow.
    pub async fn translate(&self, audio: &AudioItem, target: &str) -> Result<String, PipelineError> {
        if !self.translator.supports(target) {
            return Err(PipelineError::UnsupportedLanguage(target.to_string()));
        }

        let transcript = self.recognise(audio).await?;

        let mut lines = Vec::with_capacity(transcript.len());
        for text in transcript.texts() {
            let line = self
                .translator
                .translate(text, &self.source_language, target)
                .await?;
            lines.push(line);
        }

        Ok(format!("Translation into {target}:\n{}", lines.join("\n")))
    }

    async fn recognise(&self, audio: &AudioItem) -> Result<Transcript, PipelineError> {
        let started = Instant::now();
        let transcript = self.stt.transcribe(&audio.path).await?;
        if transcript.is_empty() {
            return Err(PipelineError::EmptyTranscript);
        }
        log::debug!(
            "pipeline: {} (received {}) → {} segments in {:?}",
            audio.id,
            audio.received_at.to_rfc3339(),
            transcript.len(),
            started.elapsed()
        );
        Ok(transcript)
    }

    fn finish(&self, conversation: ConversationId, result: Result<String, PipelineError>) -> Reply {
        match result {
            Ok(text) => Reply::text(text),
            Err(e) => {
                log::error!(
                    "pipeline: conversation {conversation} failed ({:?}): {e}",
                    e.class()
                );
                Reply::text(e.user_message())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Expiry
    // -----------------------------------------------------------------------

    /// Drop requests idle past the timeout; returns who should be told.
    pub async fn sweep_expired(&self, now: Instant) -> Vec<ConversationId> {
        let expired = self.store.sweep_expired(now);
        let mut notify = Vec::with_capacity(expired.len());
        for (conversation, audio) in expired {
            log::info!(
                "pipeline: conversation {conversation} expired ({}, received {})",
                audio.id,
                audio.received_at.to_rfc3339()
            );
            discard_audio(&audio).await;
            notify.push(conversation);
        }
        notify
    }
}

/// Remove a downloaded file that no request references any more.
async fn discard_audio(audio: &AudioItem) {
    match tokio::fs::remove_file(&audio.path).await {
        Ok(()) => log::debug!("pipeline: removed {}", audio.path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("pipeline: could not remove {}: {e}", audio.path.display()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
