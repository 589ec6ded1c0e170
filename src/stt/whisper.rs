//! Local whisper.cpp engine (`whisper` feature).
//!
//! The uploaded file is decoded to 16 kHz mono PCM and fed to a
//! `whisper_rs::WhisperContext`. Decoding and inference both run on the
//! blocking thread pool.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use whisper_rs::{FullParams, WhisperContext, WhisperContextParameters};

use crate::audio::decode_file_to_pcm;
use crate::stt::engine::{SttError, TranscriptionEngine};
use crate::stt::transcript::{Segment, Transcript};

/// Minimum clip length: 0.5 s × 16 000 Hz.
const MIN_AUDIO_SAMPLES: usize = 8_000;

// ---------------------------------------------------------------------------
// SamplingStrategy / TranscribeParams
// ---------------------------------------------------------------------------

/// Owned, `Clone` mirror of `whisper_rs::SamplingStrategy`.
#[derive(Debug, Clone, PartialEq)]
pub enum SamplingStrategy {
    Greedy { best_of: i32 },
    BeamSearch { beam_size: i32, patience: f32 },
}

impl Default for SamplingStrategy {
    fn default() -> Self {
        Self::BeamSearch {
            beam_size: 5,
            patience: 1.0,
        }
    }
}

/// Parameters for a single Whisper run.
#[derive(Debug, Clone)]
pub struct TranscribeParams {
    /// ISO-639-1 code, or `"auto"` for language detection.
    pub language: String,
    pub strategy: SamplingStrategy,
    /// CPU threads handed to Whisper.
    pub n_threads: i32,
}

impl Default for TranscribeParams {
    fn default() -> Self {
        Self {
            language: "auto".into(),
            strategy: SamplingStrategy::default(),
            n_threads: optimal_threads(),
        }
    }
}

/// Available parallelism capped at 8; Whisper gains little past that.
fn optimal_threads() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8) as i32)
        .unwrap_or(4)
}

// ---------------------------------------------------------------------------
// WhisperEngine
// ---------------------------------------------------------------------------

struct LoadedModel {
    ctx: WhisperContext,
    params: TranscribeParams,
}

// SAFETY: WhisperContext is Send+Sync as declared by whisper-rs; the weights
// are read-only after loading and every call creates its own WhisperState.
unsafe impl Send for LoadedModel {}
unsafe impl Sync for LoadedModel {}

/// Production local engine wrapping a whisper.cpp context.
#[derive(Clone)]
pub struct WhisperEngine {
    model: Arc<LoadedModel>,
}

impl std::fmt::Debug for WhisperEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperEngine")
            .field("params", &self.model.params)
            .finish_non_exhaustive()
    }
}

impl WhisperEngine {
    /// Load a GGML model from `model_path`.
    ///
    /// # Errors
    ///
    /// - [`SttError::ModelNotFound`]: `model_path` does not exist.
    /// - [`SttError::ContextInit`] : whisper-rs failed to load the file.
    pub fn load(model_path: impl AsRef<Path>, params: TranscribeParams) -> Result<Self, SttError> {
        let path = model_path.as_ref();

        if !path.exists() {
            return Err(SttError::ModelNotFound(path.display().to_string()));
        }

        let path_str = path.to_str().ok_or_else(|| {
            SttError::ModelNotFound(format!(
                "model path contains non-UTF-8 characters: {}",
                path.display()
            ))
        })?;

        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| SttError::ContextInit(e.to_string()))?;

        Ok(Self {
            model: Arc::new(LoadedModel { ctx, params }),
        })
    }

    /// Run inference over 16 kHz mono samples.
    pub fn transcribe_samples(&self, audio: &[f32]) -> Result<Transcript, SttError> {
        if audio.len() < MIN_AUDIO_SAMPLES {
            return Err(SttError::AudioTooShort);
        }

        let params = &self.model.params;

        use whisper_rs::SamplingStrategy as WS;
        let ws = match params.strategy {
            SamplingStrategy::Greedy { best_of } => WS::Greedy { best_of },
            SamplingStrategy::BeamSearch { beam_size, patience } => {
                WS::BeamSearch { beam_size, patience }
            }
        };

        let mut fp = FullParams::new(ws);
        let lang: Option<&str> = if params.language == "auto" {
            None
        } else {
            Some(params.language.as_str())
        };
        fp.set_language(lang);
        fp.set_n_threads(params.n_threads);
        fp.set_print_progress(false);
        fp.set_print_realtime(false);

        let mut state = self
            .model
            .ctx
            .create_state()
            .map_err(|e| SttError::ContextInit(e.to_string()))?;

        let wall_start = std::time::Instant::now();

        state
            .full(fp, audio)
            .map_err(|e| SttError::Transcription(e.to_string()))?;

        let n_segments = state
            .full_n_segments()
            .map_err(|e| SttError::Transcription(e.to_string()))?;

        let mut segments = Vec::with_capacity(n_segments.max(0) as usize);
        for i in 0..n_segments {
            let text = state
                .full_get_segment_text(i)
                .map_err(|e| SttError::Transcription(format!("segment {i}: {e}")))?;

            // Timestamps are in centiseconds.
            let t0 = state.full_get_segment_t0(i).unwrap_or(0).max(0) as u64 * 10;
            let t1 = state.full_get_segment_t1(i).unwrap_or(0).max(0) as u64 * 10;

            segments.push(Segment::new(t0, t1, text));
        }

        log::info!(
            "whisper: {} segments in {} ms",
            segments.len(),
            wall_start.elapsed().as_millis()
        );

        Ok(Transcript::new(segments))
    }
}

#[async_trait]
impl TranscriptionEngine for WhisperEngine {
    async fn transcribe(&self, audio_path: &Path) -> Result<Transcript, SttError> {
        let engine = self.clone();
        let path = audio_path.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let audio = decode_file_to_pcm(&path)?;
            engine.transcribe_samples(&audio)
        })
        .await
        .map_err(|e| SttError::Transcription(format!("inference task failed: {e}")))?
    }
}
