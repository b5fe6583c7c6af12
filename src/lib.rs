pub mod chunk;
pub mod config;
pub mod error;
pub mod llm;
pub mod output;
pub mod pipeline;
pub mod resolve;
pub mod summarize;
pub mod vtt;
pub mod whisper;
pub mod youtube;
pub mod ytdlp;

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

pub use error::{Error, Result};

/// A single timed piece of transcript text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

impl TranscriptSegment {
    /// Build a segment, clamping `end` so it never precedes `start`.
    pub fn new(text: impl Into<String>, start: f64, end: f64) -> Self {
        let start = start.max(0.0);
        Self {
            text: text.into(),
            start,
            end: end.max(start),
        }
    }

    /// Caption sources report a duration instead of an end time.
    pub fn from_duration(text: impl Into<String>, start: f64, duration: f64) -> Self {
        Self::new(text, start, start + duration.max(0.0))
    }
}

/// Which acquisition strategy produced a transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptSource {
    OfficialCaption,
    AutoCaption,
    DownloadedSubtitle,
    SpeechRecognition,
}

impl std::fmt::Display for TranscriptSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscriptSource::OfficialCaption => write!(f, "official_caption"),
            TranscriptSource::AutoCaption => write!(f, "auto_caption"),
            TranscriptSource::DownloadedSubtitle => write!(f, "downloaded_subtitle"),
            TranscriptSource::SpeechRecognition => write!(f, "speech_recognition"),
        }
    }
}

/// Complete transcript for a video
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    pub video_id: String,
    pub source: TranscriptSource,
    pub language: Option<String>,
    pub segments: Vec<TranscriptSegment>,
}

/// A video as requested by the caller: the original URL plus its resolved id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRef {
    pub url: String,
    pub id: String,
}

impl VideoRef {
    /// Bare ids are expanded to a canonical watch URL so downloaders can use them.
    pub fn new(input: &str) -> Self {
        let input = input.trim();
        let id = extract_video_id(input);
        let url = if input.contains("://") {
            input.to_string()
        } else {
            format!("https://www.youtube.com/watch?v={id}")
        };
        Self { url, id }
    }
}

static ID_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("valid regex"));

static ID_IN_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:v=|be/|embed/|shorts/)([A-Za-z0-9_-]{11})").expect("valid regex"));

/// Extract video ID from various YouTube URL formats.
///
/// Falls back to returning the trimmed input unchanged; callers validate the shape.
pub fn extract_video_id(input: &str) -> String {
    let input = input.trim();

    if let Some(id) = id_from_url(input) {
        return id;
    }

    if let Some(caps) = ID_IN_TEXT.captures(input) {
        return caps[1].to_string();
    }

    input.to_string()
}

fn id_from_url(input: &str) -> Option<String> {
    let url = Url::parse(input).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());

    let candidate = match host.as_str() {
        "youtu.be" => segments.next().map(str::to_string),
        "youtube.com" | "www.youtube.com" | "m.youtube.com" | "music.youtube.com" | "www.youtube-nocookie.com" => {
            match url.query_pairs().find(|(k, _)| k == "v") {
                Some((_, v)) => Some(v.into_owned()),
                None => match (segments.next(), segments.next()) {
                    (Some("embed" | "shorts" | "live" | "v"), Some(id)) => Some(id.to_string()),
                    _ => None,
                },
            }
        }
        _ => None,
    }?;

    ID_TOKEN.is_match(&candidate).then_some(candidate)
}

/// Finish an HTTP client; a builder that cannot initialise is a configuration problem.
pub(crate) fn build_http_client(builder: reqwest::ClientBuilder) -> Result<reqwest::Client> {
    builder
        .build()
        .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))
}

/// Join segment texts into one newline-separated blob, skipping blanks.
pub fn flatten(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_video_id() {
        assert_eq!(extract_video_id("dQw4w9WgXcQ"), "dQw4w9WgXcQ");
    }

    #[test]
    fn test_watch_url() {
        assert_eq!(extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"), "dQw4w9WgXcQ");
    }

    #[test]
    fn test_watch_url_with_extra_params() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ&t=120"),
            "dQw4w9WgXcQ"
        );
    }

    #[test]
    fn test_short_url() {
        assert_eq!(extract_video_id("https://youtu.be/dQw4w9WgXcQ?si=abc"), "dQw4w9WgXcQ");
    }

    #[test]
    fn test_embed_url() {
        assert_eq!(extract_video_id("https://www.youtube.com/embed/dQw4w9WgXcQ"), "dQw4w9WgXcQ");
    }

    #[test]
    fn test_shorts_url() {
        assert_eq!(extract_video_id("https://m.youtube.com/shorts/dQw4w9WgXcQ"), "dQw4w9WgXcQ");
    }

    #[test]
    fn test_schemeless_url_uses_pattern() {
        assert_eq!(extract_video_id("youtu.be/dQw4w9WgXcQ"), "dQw4w9WgXcQ");
        assert_eq!(extract_video_id("www.youtube.com/watch?v=dQw4w9WgXcQ"), "dQw4w9WgXcQ");
    }

    #[test]
    fn test_unrecognized_input_returned_unchanged() {
        assert_eq!(extract_video_id("not-a-valid-id"), "not-a-valid-id");
        assert_eq!(extract_video_id("https://example.com/video/1"), "https://example.com/video/1");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(extract_video_id(""), "");
    }

    #[test]
    fn test_whitespace_trimming() {
        assert_eq!(extract_video_id("  dQw4w9WgXcQ  "), "dQw4w9WgXcQ");
    }

    #[test]
    fn test_video_ref_expands_bare_id() {
        let video = VideoRef::new("dQw4w9WgXcQ");
        assert_eq!(video.id, "dQw4w9WgXcQ");
        assert_eq!(video.url, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");

        let video = VideoRef::new("https://youtu.be/dQw4w9WgXcQ");
        assert_eq!(video.url, "https://youtu.be/dQw4w9WgXcQ");
    }

    #[test]
    fn test_segment_end_clamped() {
        let seg = TranscriptSegment::new("x", 5.0, 3.0);
        assert_eq!(seg.end, 5.0);
        let seg = TranscriptSegment::from_duration("x", 1.5, 2.0);
        assert_eq!(seg.end, 3.5);
    }

    #[test]
    fn test_flatten_preserves_order_and_skips_blank() {
        let segments = vec![
            TranscriptSegment::new(" Hello world ", 0.0, 1.0),
            TranscriptSegment::new("   ", 1.0, 2.0),
            TranscriptSegment::new("Second line", 2.0, 3.0),
        ];
        assert_eq!(flatten(&segments), "Hello world\nSecond line");
    }

    #[test]
    fn test_http_client_builder_error_is_config() {
        let err = build_http_client(reqwest::Client::builder().user_agent("bad\nagent")).unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.starts_with("cannot build HTTP client")));
        assert!(build_http_client(reqwest::Client::builder()).is_ok());
    }

    #[test]
    fn test_flatten_empty() {
        assert_eq!(flatten(&[]), "");
    }

    #[test]
    fn test_source_display_matches_serde() {
        let json = serde_json::to_string(&TranscriptSource::DownloadedSubtitle).unwrap();
        assert_eq!(json, format!("\"{}\"", TranscriptSource::DownloadedSubtitle));
    }
}
