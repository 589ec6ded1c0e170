//! Machine translation of transcript segments.
//!
//! This module provides:
//! * [`Translator`]: async trait the pipeline calls per segment.
//! * [`NllbTranslator`]: NLLB-200 framing over a tokenizer and a seq2seq backend.
//! * [`SubwordTokenizer`] / [`HfSubwordTokenizer`]: SentencePiece pieces in and out.
//! * [`Seq2SeqBackend`] / [`Ct2ServerBackend`]: beam-search decoding.
//! * [`languages`]: the FLORES-200 tag table.
//! * [`TranslateError`]: error variants for translation.

pub mod backend;
pub mod engine;
pub mod languages;
pub mod tokenizer;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use backend::{Ct2ServerBackend, DecodeOptions, Seq2SeqBackend, TranslationBatch};
pub use engine::{frame_source, NllbTranslator, Translator, EOS};
pub use tokenizer::{HfSubwordTokenizer, SubwordTokenizer};

// ---------------------------------------------------------------------------
// TranslateError
// ---------------------------------------------------------------------------

/// Errors that can occur while translating a segment.
#[derive(Debug, Clone, Error)]
pub enum TranslateError {
    /// The subword model could not be loaded or could not process the text.
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// HTTP transport or connection error talking to the decoder.
    #[error("translation request failed: {0}")]
    Request(String),

    /// The decoder did not answer within the configured timeout.
    #[error("translation request timed out")]
    Timeout,

    /// The decoder answered with something other than the expected JSON.
    #[error("failed to parse translation response: {0}")]
    Parse(String),

    /// The decoder returned no hypothesis for a sentence.
    #[error("translation backend returned an empty hypothesis")]
    EmptyResponse,

    /// The target tag is not a FLORES-200 code.
    #[error("unsupported target language: {0}")]
    UnsupportedLanguage(String),
}

impl From<reqwest::Error> for TranslateError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TranslateError::Timeout
        } else {
            TranslateError::Request(e.to_string())
        }
    }
}
