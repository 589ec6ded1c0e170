//! Subword tokenisation for the translation model.
//!
//! NLLB uses a SentencePiece unigram model; its Hugging Face `tokenizer.json`
//! export is loaded with the `tokenizers` crate. Encoding yields the pieces
//! (`"▁Hello"`, `","`…) the seq2seq backend consumes; decoding maps pieces
//! back to ids and lets the tokenizer's decoder restore spacing.

use std::path::Path;

use tokenizers::Tokenizer;

use super::TranslateError;

/// Paired tokenizer / detokenizer keyed by one subword model file.
pub trait SubwordTokenizer: Send + Sync {
    /// Split `text` into subword pieces, without special tokens.
    fn encode(&self, text: &str) -> Result<Vec<String>, TranslateError>;

    /// Join `pieces` back into plain text. Special tokens are dropped.
    fn decode(&self, pieces: &[String]) -> Result<String, TranslateError>;
}

/// [`SubwordTokenizer`] backed by a Hugging Face `tokenizer.json`.
pub struct HfSubwordTokenizer {
    inner: Tokenizer,
}

impl HfSubwordTokenizer {
    pub fn from_file(path: &Path) -> Result<Self, TranslateError> {
        if !path.exists() {
            return Err(TranslateError::Tokenizer(format!(
                "tokenizer file not found: {}",
                path.display()
            )));
        }
        let inner = Tokenizer::from_file(path)
            .map_err(|e| TranslateError::Tokenizer(format!("{}: {e}", path.display())))?;
        Ok(Self { inner })
    }
}

impl SubwordTokenizer for HfSubwordTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<String>, TranslateError> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| TranslateError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_tokens().to_vec())
    }

    fn decode(&self, pieces: &[String]) -> Result<String, TranslateError> {
        let ids = pieces
            .iter()
            .map(|p| {
                self.inner
                    .token_to_id(p)
                    .ok_or_else(|| TranslateError::Tokenizer(format!("unknown piece {p:?}")))
            })
            .collect::<Result<Vec<u32>, _>>()?;

        self.inner
            .decode(&ids, true)
            .map(|s| s.trim().to_string())
            .map_err(|e| TranslateError::Tokenizer(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_a_tokenizer_error() {
        let err = HfSubwordTokenizer::from_file(Path::new("/nonexistent/tokenizer.json"))
            .err()
            .expect("should fail");
        assert!(matches!(err, TranslateError::Tokenizer(ref m) if m.contains("not found")));
    }

    #[test]
    fn malformed_file_is_a_tokenizer_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("tokenizer.json");
        std::fs::write(&path, "{ not json").expect("write");

        assert!(matches!(
            HfSubwordTokenizer::from_file(&path),
            Err(TranslateError::Tokenizer(_))
        ));
    }

    /// Word-level model with NLLB-style `▁` word markers and a `</s>` special.
    const TINY_TOKENIZER: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [
            {"id": 3, "content": "</s>", "single_word": false, "lstrip": false,
             "rstrip": false, "normalized": false, "special": true}
        ],
        "normalizer": null,
        "pre_tokenizer": {"type": "Metaspace", "replacement": "▁", "prepend_scheme": "always", "split": true},
        "post_processor": null,
        "decoder": {"type": "Metaspace", "replacement": "▁", "prepend_scheme": "always", "split": true},
        "model": {
            "type": "WordLevel",
            "vocab": {"<unk>": 0, "▁Hello": 1, "▁world": 2, "</s>": 3},
            "unk_token": "<unk>"
        }
    }"#;

    fn tiny() -> (tempfile::TempDir, HfSubwordTokenizer) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("tokenizer.json");
        std::fs::write(&path, TINY_TOKENIZER).expect("write");
        let tokenizer = HfSubwordTokenizer::from_file(&path).expect("load");
        (dir, tokenizer)
    }

    #[test]
    fn encode_yields_marked_pieces() {
        let (_dir, tok) = tiny();
        assert_eq!(tok.encode("Hello world").unwrap(), ["▁Hello", "▁world"]);
    }

    #[test]
    fn decode_restores_the_text() {
        let (_dir, tok) = tiny();
        let pieces = tok.encode("Hello world").unwrap();
        assert_eq!(tok.decode(&pieces).unwrap(), "Hello world");
    }

    #[test]
    fn decode_drops_special_tokens() {
        let (_dir, tok) = tiny();
        let pieces = vec!["▁Hello".to_string(), "</s>".to_string()];
        assert_eq!(tok.decode(&pieces).unwrap(), "Hello");
    }

    #[test]
    fn decode_rejects_unknown_piece() {
        let (_dir, tok) = tiny();
        let err = tok.decode(&["▁Hello".to_string(), "▁Bonjour".to_string()]).unwrap_err();
        assert!(matches!(err, TranslateError::Tokenizer(ref m) if m.contains("▁Bonjour")));
    }
}
