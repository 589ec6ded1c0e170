//! Application entry point for the voice scribe bot.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (defaults on first run, `BOT_TOKEN` applied).
//! 3. Build the transcription engine selected by `stt.backend`.
//! 4. Build the translator (tokenizer file + decoding server).
//! 5. Wire the pipeline orchestrator and the Telegram transport.
//! 6. Run the dispatcher until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use voice_scribe_bot::{
    bot::{BotApi, ChatTransport, Dispatcher},
    config::{AppConfig, AppPaths, SttBackend, BOT_TOKEN_ENV},
    pipeline::PipelineOrchestrator,
    stt::{JobPoller, PollPolicy, RemoteSttEngine, SttError, Transcript, TranscriptionEngine},
    translate::{
        languages, Ct2ServerBackend, DecodeOptions, HfSubwordTokenizer, NllbTranslator,
        TranslateError, Translator,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("voice-scribe-bot starting up");

    // 2. Configuration
    let paths = AppPaths::new();
    let config = AppConfig::load()
        .with_context(|| format!("failed to load {}", paths.settings_file.display()))?;

    if config.bot.token.trim().is_empty() {
        bail!(
            "no bot token: set {BOT_TOKEN_ENV} or bot.token in {}",
            paths.settings_file.display()
        );
    }

    std::fs::create_dir_all(&paths.audio_dir)
        .with_context(|| format!("cannot create {}", paths.audio_dir.display()))?;

    // 3. Transcription engine
    let stt = build_stt(&config, &paths);

    // 4. Translator
    let translator = build_translator(&config, &paths);

    // 5. Pipeline + transport
    let pipeline = Arc::new(PipelineOrchestrator::from_config(&config, stt, translator));
    let transport: Arc<dyn ChatTransport> = Arc::new(BotApi::from_config(&config.bot));

    let dispatcher = Dispatcher::new(
        transport,
        pipeline,
        paths.audio_dir.clone(),
        Duration::from_secs(config.conversation.sweep_interval_secs),
    );

    // 6. Run until interrupted
    log::info!("listening for updates (audio dir {})", paths.audio_dir.display());
    tokio::select! {
        _ = dispatcher.run() => log::error!("dispatcher stopped unexpectedly"),
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            log::info!("shutting down");
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Engine construction
// ---------------------------------------------------------------------------

fn build_stt(config: &AppConfig, paths: &AppPaths) -> Arc<dyn TranscriptionEngine> {
    match config.stt.backend {
        SttBackend::Remote => {
            let poller = JobPoller::new(PollPolicy::from(&config.poll));
            log::info!("remote STT at {}", config.remote.base_url);
            Arc::new(RemoteSttEngine::from_config(&config.remote, poller))
        }
        SttBackend::Local => load_local_stt(config, paths),
    }
}

#[cfg(feature = "whisper")]
fn load_local_stt(config: &AppConfig, paths: &AppPaths) -> Arc<dyn TranscriptionEngine> {
    use voice_scribe_bot::stt::{TranscribeParams, WhisperEngine};

    let model_path = paths.models_dir.join(format!("{}.bin", config.stt.model));
    let params = TranscribeParams {
        language: config.stt.language.clone(),
        ..TranscribeParams::default()
    };

    match WhisperEngine::load(&model_path, params) {
        Ok(engine) => {
            log::info!("Whisper model loaded: {}", model_path.display());
            Arc::new(engine)
        }
        Err(e) => {
            log::warn!(
                "Could not load Whisper model ({}): {e}. Transcription will fail.",
                model_path.display()
            );
            Arc::new(NoModelStt {
                reason: model_path.display().to_string(),
            })
        }
    }
}

#[cfg(not(feature = "whisper"))]
fn load_local_stt(config: &AppConfig, _paths: &AppPaths) -> Arc<dyn TranscriptionEngine> {
    log::warn!(
        "built without the `whisper` feature; local model {} is unavailable",
        config.stt.model
    );
    Arc::new(NoModelStt {
        reason: format!("{} (built without the `whisper` feature)", config.stt.model),
    })
}

fn build_translator(config: &AppConfig, paths: &AppPaths) -> Arc<dyn Translator> {
    let tokenizer_path = paths.models_dir.join(&config.translate.tokenizer_file);

    match HfSubwordTokenizer::from_file(&tokenizer_path) {
        Ok(tokenizer) => {
            log::info!(
                "NLLB tokenizer loaded: {}; decoding via {}",
                tokenizer_path.display(),
                config.translate.base_url
            );
            Arc::new(NllbTranslator::new(
                Arc::new(tokenizer),
                Arc::new(Ct2ServerBackend::from_config(&config.translate)),
                DecodeOptions::from(&config.translate),
            ))
        }
        Err(e) => {
            log::warn!("Translation unavailable: {e}");
            Arc::new(NoTokenizer {
                reason: e.to_string(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Stubs used when a model file is not present
// ---------------------------------------------------------------------------

struct NoModelStt {
    reason: String,
}

#[async_trait]
impl TranscriptionEngine for NoModelStt {
    async fn transcribe(&self, _audio_path: &std::path::Path) -> Result<Transcript, SttError> {
        Err(SttError::ModelNotFound(self.reason.clone()))
    }
}

struct NoTokenizer {
    reason: String,
}

#[async_trait]
impl Translator for NoTokenizer {
    fn supports(&self, tag: &str) -> bool {
        languages::is_supported(tag)
    }

    async fn translate(
        &self,
        _text: &str,
        _source: &str,
        _target: &str,
    ) -> Result<String, TranslateError> {
        Err(TranslateError::Tokenizer(self.reason.clone()))
    }
}
