//! NLLB-style translator: tag framing around a tokenizer and a decoder.
//!
//! One multilingual model covers every direction. The source sentence is
//! framed as `[source_tag] + pieces + ["</s>"]` and the decoder is forced to
//! start with `[target_tag]`, which is how NLLB picks the output language.

use std::sync::Arc;

use async_trait::async_trait;

use super::backend::{DecodeOptions, Seq2SeqBackend, TranslationBatch};
use super::languages;
use super::tokenizer::SubwordTokenizer;
use super::TranslateError;

/// End-of-sentence piece closing every framed source.
pub const EOS: &str = "</s>";

/// Build the framed source sequence for one sentence.
pub fn frame_source(pieces: Vec<String>, source_tag: &str) -> Vec<String> {
    let mut framed = Vec::with_capacity(pieces.len() + 2);
    framed.push(source_tag.to_string());
    framed.extend(pieces);
    framed.push(EOS.to_string());
    framed
}

// ---------------------------------------------------------------------------
// Translator trait
// ---------------------------------------------------------------------------

/// Async trait for sentence-level translation.
///
/// Implementors must be `Send + Sync` so the pipeline can hold them as
/// `Arc<dyn Translator>`.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Whether `tag` names a language this translator can target.
    fn supports(&self, tag: &str) -> bool;

    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslateError>;
}

// Compile-time check that the trait is object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Translator) {}
};

// ---------------------------------------------------------------------------
// NllbTranslator
// ---------------------------------------------------------------------------

pub struct NllbTranslator {
    tokenizer: Arc<dyn SubwordTokenizer>,
    backend: Arc<dyn Seq2SeqBackend>,
    options: DecodeOptions,
}

impl NllbTranslator {
    pub fn new(
        tokenizer: Arc<dyn SubwordTokenizer>,
        backend: Arc<dyn Seq2SeqBackend>,
        options: DecodeOptions,
    ) -> Self {
        Self {
            tokenizer,
            backend,
            options,
        }
    }

    pub fn options(&self) -> DecodeOptions {
        self.options
    }
}

#[async_trait]
impl Translator for NllbTranslator {
    fn supports(&self, tag: &str) -> bool {
        languages::is_supported(tag)
    }

    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslateError> {
        if !self.supports(target) {
            return Err(TranslateError::UnsupportedLanguage(target.to_string()));
        }

        let pieces = self.tokenizer.encode(text)?;
        let batch = TranslationBatch {
            source: vec![frame_source(pieces, source)],
            target_prefix: vec![vec![target.to_string()]],
        };

        let hypotheses = self.backend.translate_batch(&batch, &self.options).await?;
        let mut best = hypotheses
            .into_iter()
            .next()
            .ok_or(TranslateError::EmptyResponse)?;

        if best.first().map(String::as_str) == Some(target) {
            best.remove(0);
        }

        let decoded = self.tokenizer.decode(&best)?;
        log::debug!(
            "translated {} chars {source} -> {target} ({} pieces)",
            text.len(),
            best.len()
        );
        Ok(decoded)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Splits on whitespace, prefixing each word with the SentencePiece marker.
    struct WordTokenizer;

    impl SubwordTokenizer for WordTokenizer {
        fn encode(&self, text: &str) -> Result<Vec<String>, TranslateError> {
            Ok(text.split_whitespace().map(|w| format!("▁{w}")).collect())
        }

        fn decode(&self, pieces: &[String]) -> Result<String, TranslateError> {
            Ok(pieces
                .iter()
                .filter(|p| p.as_str() != EOS)
                .map(|p| p.trim_start_matches('▁'))
                .collect::<Vec<_>>()
                .join(" "))
        }
    }

    /// Records every batch and answers with a canned hypothesis.
    struct RecordingBackend {
        hypothesis: Vec<String>,
        seen: Mutex<Vec<(TranslationBatch, DecodeOptions)>>,
    }

    impl RecordingBackend {
        fn answering(pieces: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                hypothesis: pieces.iter().map(|s| s.to_string()).collect(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Seq2SeqBackend for RecordingBackend {
        async fn translate_batch(
            &self,
            batch: &TranslationBatch,
            options: &DecodeOptions,
        ) -> Result<Vec<Vec<String>>, TranslateError> {
            self.seen.lock().unwrap().push((batch.clone(), *options));
            Ok(batch.source.iter().map(|_| self.hypothesis.clone()).collect())
        }
    }

    struct EmptyBackend;

    #[async_trait]
    impl Seq2SeqBackend for EmptyBackend {
        async fn translate_batch(
            &self,
            _batch: &TranslationBatch,
            _options: &DecodeOptions,
        ) -> Result<Vec<Vec<String>>, TranslateError> {
            Ok(Vec::new())
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl Seq2SeqBackend for FailingBackend {
        async fn translate_batch(
            &self,
            _batch: &TranslationBatch,
            _options: &DecodeOptions,
        ) -> Result<Vec<Vec<String>>, TranslateError> {
            Err(TranslateError::Timeout)
        }
    }

    fn translator(backend: Arc<dyn Seq2SeqBackend>) -> NllbTranslator {
        NllbTranslator::new(Arc::new(WordTokenizer), backend, DecodeOptions::default())
    }

    #[test]
    fn frame_source_wraps_pieces() {
        let framed = frame_source(vec!["▁Hello".into(), "▁world".into()], "eng_Latn");
        assert_eq!(framed, ["eng_Latn", "▁Hello", "▁world", "</s>"]);
    }

    #[test]
    fn frame_source_of_nothing_is_tag_and_eos() {
        assert_eq!(frame_source(Vec::new(), "eng_Latn"), ["eng_Latn", "</s>"]);
    }

    #[tokio::test]
    async fn sends_framed_source_and_forced_prefix() {
        let backend = RecordingBackend::answering(&["fra_Latn", "▁Bonjour"]);
        let t = translator(backend.clone());

        let out = t.translate("Hello", "eng_Latn", "fra_Latn").await.unwrap();
        assert_eq!(out, "Bonjour");

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (batch, opts) = &seen[0];
        assert_eq!(batch.source, vec![vec!["eng_Latn", "▁Hello", "</s>"]]);
        assert_eq!(batch.target_prefix, vec![vec!["fra_Latn"]]);
        assert_eq!(opts.beam_size, 5);
        assert_eq!(opts.max_batch_tokens, 2024);
    }

    #[tokio::test]
    async fn hypothesis_without_echoed_tag_is_kept_whole() {
        let t = translator(RecordingBackend::answering(&["▁Hallo", "▁Welt"]));
        let out = t.translate("Hello world", "eng_Latn", "deu_Latn").await.unwrap();
        assert_eq!(out, "Hallo Welt");
    }

    #[tokio::test]
    async fn repeated_calls_use_the_same_tags() {
        let backend = RecordingBackend::answering(&["fra_Latn", "▁Salut"]);
        let t = translator(backend.clone());

        t.translate("Hi", "eng_Latn", "fra_Latn").await.unwrap();
        t.translate("Hi", "eng_Latn", "fra_Latn").await.unwrap();

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].0, seen[1].0);
    }

    #[tokio::test]
    async fn unsupported_target_is_rejected_before_decoding() {
        let backend = RecordingBackend::answering(&["▁x"]);
        let t = translator(backend.clone());

        let err = t.translate("Hello", "eng_Latn", "French").await.unwrap_err();
        assert!(matches!(err, TranslateError::UnsupportedLanguage(ref c) if c == "French"));
        assert!(backend.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_backend_answer_is_an_error() {
        let t = translator(Arc::new(EmptyBackend));
        let err = t.translate("Hello", "eng_Latn", "fra_Latn").await.unwrap_err();
        assert!(matches!(err, TranslateError::EmptyResponse));
    }

    #[tokio::test]
    async fn backend_errors_propagate() {
        let t = translator(Arc::new(FailingBackend));
        let err = t.translate("Hello", "eng_Latn", "fra_Latn").await.unwrap_err();
        assert!(matches!(err, TranslateError::Timeout));
    }

    #[test]
    fn supports_flores_tags_only() {
        let t = translator(Arc::new(EmptyBackend));
        assert!(t.supports("rus_Cyrl"));
        assert!(!t.supports("ru"));
    }
}
