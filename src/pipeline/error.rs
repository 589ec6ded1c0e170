//! Flow-level error taxonomy and the replies users see for each class.

use std::time::Duration;

use thiserror::Error;

use crate::stt::SttError;
use crate::translate::TranslateError;

/// Reply sent for every engine or remote-job failure.
pub const GENERIC_FAILURE: &str =
    "Sorry, something went wrong while processing your audio. Please send it again.";

/// Reply sent when text arrives with no audio pending.
pub const SEND_AUDIO_FIRST: &str = "Please send an audio file first.";

/// Reply sent when the text matches neither action label.
pub const FALLBACK: &str = "Sorry, I didn't understand that. Please choose one of the buttons.";

/// Coarse error class; decides whether the pending request survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad user input. Answered with a clarifying prompt, state untouched.
    Input,
    /// A transcription or translation call failed.
    Engine,
    /// The remote job failed, misbehaved or ran out of time.
    RemoteJob,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no pending audio for this conversation")]
    NoPendingAudio,

    #[error("unrecognized action {0:?}")]
    UnrecognizedAction(String),

    #[error("unsupported target language {0:?}")]
    UnsupportedLanguage(String),

    #[error("transcription engine failed: {0}")]
    Engine(SttError),

    #[error("translation failed: {0}")]
    Translation(TranslateError),

    #[error("remote job failed: {0}")]
    RemoteJobFailed(String),

    #[error("remote job returned a malformed response: {0}")]
    RemoteJobMalformed(String),

    #[error("remote job timed out after {attempts} status queries ({elapsed:?})")]
    Timeout { attempts: u32, elapsed: Duration },

    #[error("transcript has no segments")]
    EmptyTranscript,
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PipelineError::NoPendingAudio
            | PipelineError::UnrecognizedAction(_)
            | PipelineError::UnsupportedLanguage(_) => ErrorClass::Input,
            PipelineError::Engine(_)
            | PipelineError::Translation(_)
            | PipelineError::EmptyTranscript => ErrorClass::Engine,
            PipelineError::RemoteJobFailed(_)
            | PipelineError::RemoteJobMalformed(_)
            | PipelineError::Timeout { .. } => ErrorClass::RemoteJob,
        }
    }

    /// Text sent back to the user. Failures all collapse to one message.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::NoPendingAudio => SEND_AUDIO_FIRST.to_string(),
            PipelineError::UnrecognizedAction(_) => FALLBACK.to_string(),
            PipelineError::UnsupportedLanguage(code) => unsupported_language_message(code),
            _ => GENERIC_FAILURE.to_string(),
        }
    }
}

fn unsupported_language_message(code: &str) -> String {
    let hints = crate::translate::languages::suggestions(code);
    if hints.is_empty() {
        format!(
            "\"{code}\" is not a supported language code. \
             Use a FLORES-200 code such as fra_Latn, deu_Latn or rus_Cyrl."
        )
    } else {
        format!(
            "\"{code}\" is not a supported language code. Did you mean: {}?",
            hints.join(", ")
        )
    }
}

impl From<SttError> for PipelineError {
    fn from(e: SttError) -> Self {
        match e {
            SttError::RemoteJobFailed(reason) => PipelineError::RemoteJobFailed(reason),
            SttError::RemoteJobMalformed(detail) => PipelineError::RemoteJobMalformed(detail),
            SttError::Timeout { attempts, elapsed } => {
                PipelineError::Timeout { attempts, elapsed }
            }
            other => PipelineError::Engine(other),
        }
    }
}

impl From<TranslateError> for PipelineError {
    fn from(e: TranslateError) -> Self {
        match e {
            TranslateError::UnsupportedLanguage(code) => PipelineError::UnsupportedLanguage(code),
            other => PipelineError::Translation(other),
        }
    }
}
