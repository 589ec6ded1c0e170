//! Asynchronous remote transcription service client.
//!
//! Wire protocol:
//!
//! ```text
//! POST {base_url}/recognize        multipart: file, language, punctuation, format
//!   ← { "id": "<job id>" }
//! GET  {base_url}/jobs/{id}
//!   ← { "status": "queued" | "processing" | "finished" | "failed",
//!       "result": "<caption document>", "error": "..." }
//! ```
//!
//! The finished result is an SRT or WebVTT document; every cue becomes one
//! [`Segment`](crate::stt::Segment).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::RemoteSttConfig;
use crate::stt::captions::parse_captions;
use crate::stt::engine::{SttError, TranscriptionEngine};
use crate::stt::poller::{JobId, JobPoller, JobStatusSource, PollOutcome, StatusReport};
use crate::stt::transcript::Transcript;

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(alias = "job_id")]
    id: String,
}

/// Remote engine: submit, poll to completion, parse captions.
pub struct RemoteSttEngine {
    client: reqwest::Client,
    config: RemoteSttConfig,
    base_url: String,
    poller: JobPoller,
}

impl RemoteSttEngine {
    /// Build the engine from config.
    ///
    /// The HTTP client carries the per-request timeout from
    /// `config.timeout_secs`; the poller bounds the job as a whole.
    pub fn from_config(config: &RemoteSttConfig, poller: JobPoller) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
            config: config.clone(),
            poller,
        }
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => req.bearer_auth(key),
            _ => req,
        }
    }

    /// Upload `audio` and return the id of the accepted job.
    pub async fn submit(&self, audio: Vec<u8>, file_name: &str) -> Result<JobId, SttError> {
        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str("application/octet-stream")?;

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("language", self.config.language.clone())
            .text("punctuation", self.config.punctuation.to_string())
            .text("format", self.config.format.as_str());

        let url = format!("{}/recognize", self.base_url);
        let response = self
            .with_auth(self.client.post(&url))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SttError::Request(format!("submit returned {status}: {body}")));
        }

        let accepted: SubmitResponse = response
            .json()
            .await
            .map_err(|e| SttError::Parse(format!("submit response: {e}")))?;

        log::info!("remote stt: job {} accepted", accepted.id);
        Ok(JobId(accepted.id))
    }
}

#[async_trait]
impl JobStatusSource for RemoteSttEngine {
    async fn query_status(&self, job: &JobId) -> Result<StatusReport, SttError> {
        let url = format!("{}/jobs/{}", self.base_url, job);
        let response = self.with_auth(self.client.get(&url)).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SttError::Request(format!("status query returned {status}: {body}")));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SttError::Parse(format!("status response: {e}")))?;

        Ok(StatusReport::from_json(&body))
    }
}

#[async_trait]
impl TranscriptionEngine for RemoteSttEngine {
    async fn transcribe(&self, audio_path: &Path) -> Result<Transcript, SttError> {
        let audio = tokio::fs::read(audio_path)
            .await
            .map_err(|e| SttError::Request(format!("read {}: {e}", audio_path.display())))?;
        let file_name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.ogg");

        let job = self.submit(audio, file_name).await?;
        let outcome = self.poller.poll(self, &job).await?;
        transcript_from_outcome(outcome)
    }
}

/// Map a finished poll loop to a transcript or a specific error.
pub(crate) fn transcript_from_outcome(outcome: PollOutcome) -> Result<Transcript, SttError> {
    match outcome {
        PollOutcome::Finished { result } => Ok(Transcript::new(parse_captions(&result)?)),
        PollOutcome::Failed { reason } => Err(SttError::RemoteJobFailed(reason)),
        PollOutcome::StatusMissing => Err(SttError::RemoteJobMalformed(
            "response has no status field".into(),
        )),
        PollOutcome::UnknownStatus(status) => Err(SttError::RemoteJobMalformed(format!(
            "unknown status {status:?}"
        ))),
    }
}
