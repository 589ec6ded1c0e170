//! Segment store: the ordered, time-aligned output of one transcription.

/// A single time-aligned span of recognised speech.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Segment start in milliseconds from the start of the audio.
    pub start_ms: u64,
    /// Segment end in milliseconds from the start of the audio.
    pub end_ms: u64,
    /// Recognised text.
    pub text: String,
}

impl Segment {
    pub fn new(start_ms: u64, end_ms: u64, text: impl Into<String>) -> Self {
        Self {
            start_ms,
            end_ms,
            text: text.into(),
        }
    }
}

/// Immutable, chronologically ordered segments for one audio item.
///
/// Segment text is trimmed on construction and blank segments are dropped,
/// so every stored segment has non-empty text. The order given by the engine
/// is kept as is.
///
/// ```rust
/// use voice_scribe_bot::stt::{Segment, Transcript};
///
/// let t = Transcript::new(vec![
///     Segment::new(0, 1_000, " Hello"),
///     Segment::new(1_000, 2_000, "   "),
///     Segment::new(2_000, 3_000, "world "),
/// ]);
/// assert_eq!(t.len(), 2);
/// assert_eq!(t.joined(), "Hello\nworld");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    segments: Vec<Segment>,
}

impl Transcript {
    pub fn new(segments: impl IntoIterator<Item = Segment>) -> Self {
        let segments = segments
            .into_iter()
            .filter_map(|mut seg| {
                let trimmed = seg.text.trim();
                if trimmed.is_empty() {
                    return None;
                }
                if trimmed.len() != seg.text.len() {
                    seg.text = trimmed.to_string();
                }
                Some(seg)
            })
            .collect();
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segment texts in order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(|s| s.text.as_str())
    }

    /// One line per segment, joined with `\n`.
    pub fn joined(&self) -> String {
        self.texts().collect::<Vec<_>>().join("\n")
    }
}
