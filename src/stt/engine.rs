//! Core transcription engine trait and error type.
//!
//! [`TranscriptionEngine`] is the interface the pipeline uses. It is
//! object-safe and `Send + Sync` so it can be held behind an
//! `Arc<dyn TranscriptionEngine>`.
//!
//! Implementations:
//! * [`WhisperEngine`](crate::stt::WhisperEngine): local whisper.cpp model
//!   (`whisper` feature).
//! * [`RemoteSttEngine`](crate::stt::RemoteSttEngine): asynchronous HTTP
//!   job service, polled to completion.
//! * `MockEngine` (`#[cfg(test)]`): scripted responses for pipeline tests.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::audio::AudioError;
use crate::stt::captions::CaptionError;
use crate::stt::transcript::Transcript;

// ---------------------------------------------------------------------------
// SttError
// ---------------------------------------------------------------------------

/// All errors that can arise from the STT subsystem.
#[derive(Debug, Clone, Error)]
pub enum SttError {
    /// The GGML model file was not found at the given path.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// `whisper_rs` failed to initialise a context or state.
    #[error("whisper context initialisation failed: {0}")]
    ContextInit(String),

    /// An error occurred during the inference pass.
    #[error("transcription error: {0}")]
    Transcription(String),

    /// The decoded clip is shorter than the 0.5 s minimum.
    #[error("audio too short: minimum 0.5 s")]
    AudioTooShort,

    /// The uploaded file could not be read or decoded.
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// HTTP transport or non-success status from the remote service.
    #[error("remote request failed: {0}")]
    Request(String),

    /// The remote service answered with a body we could not interpret.
    #[error("unexpected remote response: {0}")]
    Parse(String),

    /// The remote job reached the `failed` state.
    #[error("remote job failed: {0}")]
    RemoteJobFailed(String),

    /// The remote job stopped reporting a usable status.
    #[error("remote job returned a malformed status: {0}")]
    RemoteJobMalformed(String),

    /// The job was still running when the polling budget ran out.
    #[error("remote job timed out after {attempts} status queries ({elapsed:?})")]
    Timeout { attempts: u32, elapsed: Duration },

    /// The finished caption document could not be parsed.
    #[error(transparent)]
    Captions(#[from] CaptionError),
}

impl From<reqwest::Error> for SttError {
    fn from(e: reqwest::Error) -> Self {
        SttError::Request(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// TranscriptionEngine trait
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe interface for speech-to-text engines.
///
/// Engine-internal language detection and confidence metadata are not part of
/// the contract; only the ordered segments are returned.
#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    /// Transcribe the audio file at `audio_path`.
    async fn transcribe(&self, audio_path: &Path) -> Result<Transcript, SttError>;
}

// Compile-time assertion: Box<dyn TranscriptionEngine> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn TranscriptionEngine>) {}
};

// ---------------------------------------------------------------------------
// MockEngine  (test-only)
// ---------------------------------------------------------------------------

/// Test double that returns a pre-configured response and counts calls.
#[cfg(test)]
pub struct MockEngine {
    response: Result<Transcript, SttError>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockEngine {
    /// A mock whose transcript holds `(text, start_ms, end_ms)` segments.
    pub fn ok(segments: &[(&str, u64, u64)]) -> Self {
        use crate::stt::transcript::Segment;
        let transcript = Transcript::new(
            segments
                .iter()
                .map(|(text, start, end)| Segment::new(*start, *end, *text)),
        );
        Self {
            response: Ok(transcript),
            calls: Default::default(),
        }
    }

    pub fn err(error: SttError) -> Self {
        Self {
            response: Err(error),
            calls: Default::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl TranscriptionEngine for MockEngine {
    async fn transcribe(&self, _audio_path: &Path) -> Result<Transcript, SttError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.response.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_ok_returns_configured_segments() {
        let engine = MockEngine::ok(&[("Hello", 0, 1_000), ("world", 1_000, 2_000)]);
        let t = engine.transcribe(Path::new("a.ogg")).await.unwrap();
        assert_eq!(t.joined(), "Hello\nworld");
        assert_eq!(engine.calls(), 1);
    }

    #[tokio::test]
    async fn mock_err_returns_configured_error() {
        let engine = MockEngine::err(SttError::Transcription("boom".into()));
        let err = engine.transcribe(Path::new("a.ogg")).await.unwrap_err();
        assert!(matches!(err, SttError::Transcription(_)));
    }

    #[test]
    fn box_dyn_engine_compiles() {
        let _engine: Box<dyn TranscriptionEngine> = Box::new(MockEngine::ok(&[]));
    }

    #[test]
    fn error_display_names_the_cause() {
        let e = SttError::ModelNotFound("/models/ggml-medium.bin".into());
        assert!(e.to_string().contains("/models/ggml-medium.bin"));

        let e = SttError::Timeout {
            attempts: 7,
            elapsed: Duration::from_secs(30),
        };
        assert!(e.to_string().contains("7 status queries"));
    }

    #[test]
    fn audio_errors_convert() {
        let e: SttError = AudioError::Unsupported("opus".into()).into();
        assert!(matches!(e, SttError::Audio(AudioError::Unsupported(_))));
    }
}
