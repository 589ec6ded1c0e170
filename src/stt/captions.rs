//! SubRip (SRT) and WebVTT caption parsing.
//!
//! The remote service returns its finished result as a caption document. All
//! cues are extracted and returned as [`Segment`]s sorted by start time.
//! Both formats share the same block shape:
//!
//! ```text
//! [index or cue id]
//! 00:00:01,000 --> 00:00:02,500 [cue settings]
//! text line
//! [more text lines]
//! <blank line>
//! ```
//!
//! `WEBVTT` headers and `NOTE` / `STYLE` / `REGION` blocks are skipped.

use thiserror::Error;

use super::transcript::Segment;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptionError {
    /// A cue timing line held a timestamp that could not be parsed.
    #[error("invalid caption timestamp: {0:?}")]
    Timestamp(String),
}

/// Parse an SRT or WebVTT document into time-ordered segments.
///
/// Multi-line cue text is joined with a single space and inline markup such
/// as `<v Speaker>` or `<i>` is removed. Cues whose text is empty after that
/// are skipped. The sort is stable, so cues with equal start times keep their
/// document order.
pub fn parse_captions(document: &str) -> Result<Vec<Segment>, CaptionError> {
    let normalized = document
        .trim_start_matches('\u{feff}')
        .replace("\r\n", "\n")
        .replace('\r', "\n");

    let mut segments = Vec::new();

    for block in normalized.split("\n\n") {
        let lines: Vec<&str> = block.lines().filter(|l| !l.trim().is_empty()).collect();
        let Some(first) = lines.first() else {
            continue;
        };

        let first = first.trim_start();
        if first.starts_with("WEBVTT")
            || first.starts_with("NOTE")
            || first.starts_with("STYLE")
            || first.starts_with("REGION")
        {
            continue;
        }

        let Some(timing_idx) = lines.iter().position(|l| l.contains("-->")) else {
            continue;
        };

        let (start_ms, end_ms) = parse_timing(lines[timing_idx])?;

        let text = lines[timing_idx + 1..]
            .iter()
            .map(|l| strip_tags(l.trim()))
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if text.is_empty() {
            continue;
        }

        segments.push(Segment::new(start_ms, end_ms, text));
    }

    segments.sort_by_key(|s| s.start_ms);
    Ok(segments)
}

fn parse_timing(line: &str) -> Result<(u64, u64), CaptionError> {
    let (left, right) = line
        .split_once("-->")
        .ok_or_else(|| CaptionError::Timestamp(line.to_string()))?;

    // WebVTT cue settings follow the end timestamp after whitespace.
    let end = right.split_whitespace().next().unwrap_or("");

    Ok((parse_timestamp(left.trim())?, parse_timestamp(end)?))
}

/// Parse `HH:MM:SS,mmm`, `HH:MM:SS.mmm` or `MM:SS.mmm` into milliseconds.
fn parse_timestamp(raw: &str) -> Result<u64, CaptionError> {
    let invalid = || CaptionError::Timestamp(raw.to_string());

    let normalized = raw.replace(',', ".");
    let (clock, frac) = normalized.split_once('.').unwrap_or((normalized.as_str(), "0"));

    let parts: Vec<u64> = clock
        .split(':')
        .map(|p| p.trim().parse::<u64>().map_err(|_| invalid()))
        .collect::<Result<_, _>>()?;

    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, s] => (*h, *m, *s),
        [m, s] => (0, *m, *s),
        _ => return Err(invalid()),
    };
    if minutes >= 60 || seconds >= 60 {
        return Err(invalid());
    }

    if frac.is_empty() || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    // Scale the fraction to milliseconds: "5" → 500, "05" → 50, "0505" → 50.
    let millis_str: String = frac.chars().chain("000".chars()).take(3).collect();
    let millis: u64 = millis_str.parse().map_err(|_| invalid())?;

    hours
        .checked_mul(60)
        .and_then(|m| m.checked_add(minutes))
        .and_then(|m| m.checked_mul(60))
        .and_then(|s| s.checked_add(seconds))
        .and_then(|s| s.checked_mul(1_000))
        .and_then(|ms| ms.checked_add(millis))
        .ok_or_else(invalid)
}

/// Remove `<...>` markup. A `<` with no closing `>` after it is literal text.
fn strip_tags(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        match rest[open..].find('>') {
            Some(close) => rest = &rest[open + close + 1..],
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}
