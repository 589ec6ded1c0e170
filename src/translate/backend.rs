//! Seq2seq decoding backend.
//!
//! The backend receives already-tokenised source sentences plus a forced
//! target prefix per sentence and returns the best hypothesis for each, as
//! pieces. [`Ct2ServerBackend`] forwards the batch to a CTranslate2 serving
//! process over HTTP:
//!
//! ```text
//! POST {base_url}/translate_batch
//! { "source": [["eng_Latn", "▁Hello", "</s>"]],
//!   "target_prefix": [["fra_Latn"]],
//!   "beam_size": 5, "max_batch_size": 2024, "batch_type": "tokens" }
//!   ← { "hypotheses": [["fra_Latn", "▁Bonjour"]] }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::TranslateConfig;

use super::TranslateError;

/// Decoding knobs shared by every batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    pub beam_size: u32,
    /// Token ceiling per batch; the backend splits larger batches.
    pub max_batch_tokens: u32,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            beam_size: 5,
            max_batch_tokens: 2024,
        }
    }
}

impl From<&TranslateConfig> for DecodeOptions {
    fn from(cfg: &TranslateConfig) -> Self {
        Self {
            beam_size: cfg.beam_size.max(1),
            max_batch_tokens: cfg.max_batch_tokens.max(1),
        }
    }
}

/// Source sentences and their forced target prefixes, index-aligned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationBatch {
    pub source: Vec<Vec<String>>,
    pub target_prefix: Vec<Vec<String>>,
}

#[async_trait]
pub trait Seq2SeqBackend: Send + Sync {
    /// Top hypothesis per source sentence, in input order.
    async fn translate_batch(
        &self,
        batch: &TranslationBatch,
        options: &DecodeOptions,
    ) -> Result<Vec<Vec<String>>, TranslateError>;
}

// ---------------------------------------------------------------------------
// Ct2ServerBackend
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    source: &'a [Vec<String>],
    target_prefix: &'a [Vec<String>],
    beam_size: u32,
    max_batch_size: u32,
    batch_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    hypotheses: Vec<Vec<String>>,
}

/// HTTP client for a CTranslate2 `translate_batch` endpoint.
pub struct Ct2ServerBackend {
    client: reqwest::Client,
    base_url: String,
}

impl Ct2ServerBackend {
    pub fn from_config(config: &TranslateConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Seq2SeqBackend for Ct2ServerBackend {
    async fn translate_batch(
        &self,
        batch: &TranslationBatch,
        options: &DecodeOptions,
    ) -> Result<Vec<Vec<String>>, TranslateError> {
        let body = BatchRequest {
            source: &batch.source,
            target_prefix: &batch.target_prefix,
            beam_size: options.beam_size,
            max_batch_size: options.max_batch_tokens,
            batch_type: "tokens",
        };

        let url = format!("{}/translate_batch", self.base_url);
        let response = self.client.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(TranslateError::Request(format!("{status}: {text}")));
        }

        let parsed: BatchResponse = response
            .json()
            .await
            .map_err(|e| TranslateError::Parse(e.to_string()))?;

        if parsed.hypotheses.len() != batch.source.len() {
            return Err(TranslateError::Parse(format!(
                "expected {} hypotheses, got {}",
                batch.source.len(),
                parsed.hypotheses.len()
            )));
        }

        Ok(parsed.hypotheses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_matches_wire_format() {
        let source = vec![vec!["eng_Latn".to_string(), "▁Hi".into(), "</s>".into()]];
        let prefix = vec![vec!["fra_Latn".to_string()]];
        let body = BatchRequest {
            source: &source,
            target_prefix: &prefix,
            beam_size: 5,
            max_batch_size: 2024,
            batch_type: "tokens",
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "source": [["eng_Latn", "▁Hi", "</s>"]],
                "target_prefix": [["fra_Latn"]],
                "beam_size": 5,
                "max_batch_size": 2024,
                "batch_type": "tokens"
            })
        );
    }

    #[test]
    fn decode_options_from_config() {
        let opts = DecodeOptions::from(&TranslateConfig::default());
        assert_eq!(opts, DecodeOptions::default());

        let cfg = TranslateConfig {
            beam_size: 0,
            ..TranslateConfig::default()
        };
        assert_eq!(DecodeOptions::from(&cfg).beam_size, 1);
    }

    #[test]
    fn base_url_is_normalised() {
        let cfg = TranslateConfig {
            base_url: "http://ct2:5000/".into(),
            ..TranslateConfig::default()
        };
        assert_eq!(Ct2ServerBackend::from_config(&cfg).base_url, "http://ct2:5000");
    }
}
