//! Audio preparation for the local recognition engine.
//!
//! ```text
//! uploaded file → symphonia probe/decode → stereo_to_mono → resample_to_16k
//! ```
//!
//! The remote engine uploads the original bytes and never touches this module.

pub mod decode;
pub mod resample;

pub use decode::{decode_file_to_pcm, decode_to_pcm};
pub use resample::{resample_to_16k, stereo_to_mono, TARGET_SAMPLE_RATE};

use thiserror::Error;

/// Errors raised while turning an uploaded file into PCM samples.
#[derive(Debug, Clone, Error)]
pub enum AudioError {
    /// The file could not be read from disk.
    #[error("audio file unreadable: {0}")]
    Io(String),

    /// The container or a packet could not be parsed.
    #[error("audio decoding failed: {0}")]
    Decode(String),

    /// The codec is not supported by the decoder (e.g. Opus voice notes).
    #[error("unsupported audio codec: {0}")]
    Unsupported(String),

    /// The resampler rejected its input.
    #[error("resampling failed: {0}")]
    Resample(String),
}
