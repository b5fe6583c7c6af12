use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use crate::TranscriptSegment;

/// End time assumed for a cue whose end stamp is missing.
const DEFAULT_CUE_SECS: f64 = 2.0;

static INLINE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// Parse a WebVTT-style cue file into ordered segments.
///
/// Never fails: malformed timing lines are kept as text, cues with no text are
/// dropped, and anything before the first cue (header metadata) is ignored.
pub fn parse_vtt(contents: &str) -> Vec<TranscriptSegment> {
    let mut segments = Vec::new();
    let mut buf: Vec<String> = Vec::new();
    let mut timing: Option<(f64, f64)> = None;
    let mut pending_id: Option<&str> = None;
    let mut in_block_comment = false;
    let mut after_blank = true;

    for raw in contents.lines() {
        let line = raw.trim();

        if line.is_empty() {
            in_block_comment = false;
            after_blank = true;
            continue;
        }
        if line.starts_with("WEBVTT") {
            after_blank = false;
            continue;
        }
        if after_blank && ["NOTE", "STYLE", "REGION"].iter().any(|k| line.starts_with(k)) {
            in_block_comment = true;
        }
        if in_block_comment {
            continue;
        }

        if let Some((start, end)) = parse_cue_timing(line) {
            pending_id = None;
            flush(&mut segments, &mut buf, timing.take());
            timing = Some((start, end.unwrap_or(start + DEFAULT_CUE_SECS)));
            after_blank = false;
            continue;
        }

        // Held back until we know whether a timing line follows.
        if let Some(id) = pending_id.take() {
            buf.push(id.to_string());
        }
        if after_blank && line.bytes().all(|b| b.is_ascii_digit()) {
            pending_id = Some(line);
        } else {
            buf.push(clean_text(line));
        }
        after_blank = false;
    }

    if let Some(id) = pending_id {
        buf.push(id.to_string());
    }
    flush(&mut segments, &mut buf, timing);

    debug!("Parsed {} cues", segments.len());
    segments
}

fn flush(segments: &mut Vec<TranscriptSegment>, buf: &mut Vec<String>, timing: Option<(f64, f64)>) {
    let text = buf.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ");
    buf.clear();

    if let Some((start, end)) = timing {
        if !text.is_empty() {
            segments.push(TranscriptSegment::new(text, start, end));
        }
    }
}

fn clean_text(line: &str) -> String {
    let stripped = INLINE_TAG.replace_all(line, "");
    html_escape::decode_html_entities(stripped.trim()).to_string()
}

/// Parse `<start> --> <end> [settings]`. The end stamp is optional.
fn parse_cue_timing(line: &str) -> Option<(f64, Option<f64>)> {
    let (left, right) = line.split_once("-->")?;
    let start = parse_timestamp(left.trim())?;
    let end = right.split_whitespace().next().and_then(parse_timestamp);
    Some((start, end))
}

/// Parse `H:MM:SS.mmm` or `MM:SS.mmm` (comma decimal accepted) into seconds.
pub fn parse_timestamp(stamp: &str) -> Option<f64> {
    let stamp = stamp.replace(',', ".");
    let fields: Vec<&str> = stamp.split(':').collect();

    let (hours, minutes, seconds) = match fields.as_slice() {
        [h, m, s] => (whole(h)?, whole(m)?, fraction(s)?),
        [m, s] => (0, whole(m)?, fraction(s)?),
        _ => return None,
    };

    let whole_secs = hours.checked_mul(3600)?.checked_add(minutes.checked_mul(60)?)?;
    Some(whole_secs as f64 + seconds)
}

fn whole(field: &str) -> Option<u64> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

fn fraction(field: &str) -> Option<f64> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return None;
    }
    field.parse().ok()
}
