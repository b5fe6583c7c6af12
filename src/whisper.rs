use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use eyre::{Result, bail};
use log::debug;
use reqwest::multipart;
use tokio::process::Command;

use crate::{TranscriptSegment, build_http_client};
use crate::config::WhisperConfig;

/// Assumed bitrate when estimating audio length from file size (192 kbps)
const ASSUMED_BYTES_PER_SEC: f64 = 192_000.0 / 8.0;

/// Turns an audio file into timed text.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn recognize(&self, audio: &Path, language_hint: Option<&str>) -> Result<Vec<TranscriptSegment>>;
}

/// Client for an OpenAI-compatible transcription endpoint.
///
/// Defaults target a local faster-whisper server, which honours `vad_filter`.
pub struct WhisperRecognizer {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    max_upload_bytes: Option<u64>,
}

impl WhisperRecognizer {
    pub fn new(config: &WhisperConfig, timeout: Duration) -> crate::Result<Self> {
        let client = build_http_client(reqwest::Client::builder().timeout(timeout))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_upload_bytes: config.max_upload_mb.map(|mb| mb * 1024 * 1024),
        })
    }

    async fn transcribe_file(&self, audio_path: &Path, language_hint: Option<&str>) -> Result<Vec<TranscriptSegment>> {
        debug!("Uploading {} to {}", audio_path.display(), self.base_url);

        let file_bytes = tokio::fs::read(audio_path).await?;
        let file_name = audio_path.file_name().unwrap_or_default().to_string_lossy().to_string();

        let file_part = multipart::Part::bytes(file_bytes)
            .file_name(file_name)
            .mime_str(mime_type(audio_path))?;

        let mut form = multipart::Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment")
            .text("vad_filter", "true");

        if let Some(lang) = language_hint {
            form = form.text("language", lang.to_string());
        }

        let mut req = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .multipart(form);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("transcription server returned {status}: {body}");
        }

        let json: serde_json::Value = resp.json().await?;
        parse_whisper_response(&json)
    }

    async fn transcribe_chunked(
        &self,
        audio_path: &Path,
        language_hint: Option<&str>,
        max_bytes: u64,
    ) -> Result<Vec<TranscriptSegment>> {
        let file_size = tokio::fs::metadata(audio_path).await?.len();
        let plan = plan_splits(file_size, max_bytes);
        let work_dir = audio_path.parent().unwrap_or_else(|| Path::new("."));

        debug!("Splitting audio into {} pieces of {}s", plan.len(), plan.first().map_or(0, |p| p.1));

        let mut all_segments = Vec::new();

        for (i, (offset, length)) in plan.into_iter().enumerate() {
            let piece = work_dir.join(format!("piece-{i}.{}", extension(audio_path)));
            split_audio(audio_path, &piece, offset, length).await?;

            let segments = self.transcribe_file(&piece, language_hint).await;
            let _ = tokio::fs::remove_file(&piece).await;

            // Re-anchor piece-relative times to the full recording
            all_segments.extend(
                segments?
                    .into_iter()
                    .map(|s| TranscriptSegment::new(s.text, s.start + offset as f64, s.end + offset as f64)),
            );
        }

        Ok(all_segments)
    }
}

#[async_trait]
impl SpeechRecognizer for WhisperRecognizer {
    async fn recognize(&self, audio: &Path, language_hint: Option<&str>) -> Result<Vec<TranscriptSegment>> {
        let file_size = tokio::fs::metadata(audio).await?.len();
        debug!("Audio file size: {file_size} bytes");

        match self.max_upload_bytes {
            Some(max) if file_size > max => self.transcribe_chunked(audio, language_hint, max).await,
            _ => self.transcribe_file(audio, language_hint).await,
        }
    }
}

fn parse_whisper_response(json: &serde_json::Value) -> Result<Vec<TranscriptSegment>> {
    // verbose_json format has a "segments" array
    if let Some(segments) = json.get("segments").and_then(|s| s.as_array()) {
        return Ok(segments
            .iter()
            .filter_map(|seg| {
                let text = seg.get("text")?.as_str()?.trim().to_string();
                let start = seg.get("start")?.as_f64()?;
                let end = seg.get("end")?.as_f64()?;
                if text.is_empty() {
                    return None;
                }
                Some(TranscriptSegment::new(text, start, end))
            })
            .collect());
    }

    // Fallback: plain text response
    if let Some(text) = json.get("text").and_then(|t| t.as_str()) {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let end = json.get("duration").and_then(|d| d.as_f64()).unwrap_or(0.0);
        return Ok(vec![TranscriptSegment::new(text, 0.0, end)]);
    }

    bail!("unexpected transcription response format");
}

/// `(offset_secs, length_secs)` pieces that each stay under `max_bytes`.
fn plan_splits(file_size: u64, max_bytes: u64) -> Vec<(u64, u64)> {
    let max_bytes = max_bytes.max(1);
    let pieces = file_size.div_ceil(max_bytes).max(1);
    let estimated_secs = (file_size as f64 / ASSUMED_BYTES_PER_SEC).ceil() as u64;
    let length = estimated_secs.div_ceil(pieces).max(1);

    (0..pieces).map(|i| (i * length, length)).collect()
}

async fn split_audio(input: &Path, output: &Path, offset: u64, length: u64) -> Result<()> {
    let offset_arg = offset.to_string();
    let length_arg = length.to_string();
    let status = Command::new("ffmpeg")
        .args(["-y", "-loglevel", "error", "-ss", offset_arg.as_str(), "-t", length_arg.as_str(), "-i"])
        .arg(input)
        .args(["-acodec", "copy"])
        .arg(output)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await;

    match status {
        Ok(s) if s.success() => Ok(()),
        Ok(s) => bail!("ffmpeg failed to split audio at offset {offset}s: {s}"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => bail!("ffmpeg not found; needed to split large audio"),
        Err(e) => bail!("failed to run ffmpeg: {e}"),
    }
}

fn extension(path: &Path) -> String {
    path.extension().and_then(|e| e.to_str()).unwrap_or("m4a").to_string()
}

fn mime_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("m4a") | Some("m4b") | Some("aac") => "audio/mp4",
        Some("ogg") | Some("opus") => "audio/ogg",
        Some("webm") => "audio/webm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_whisper_response_verbose_json() {
        let json = serde_json::json!({
            "text": "Hello world. This is a test.",
            "segments": [
                {
                    "id": 0,
                    "start": 0.0,
                    "end": 1.5,
                    "text": " Hello world."
                },
                {
                    "id": 1,
                    "start": 1.5,
                    "end": 3.0,
                    "text": " This is a test."
                }
            ]
        });

        let segments = parse_whisper_response(&json).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "Hello world.");
        assert!((segments[0].start - 0.0).abs() < f64::EPSILON);
        assert!((segments[0].end - 1.5).abs() < f64::EPSILON);
        assert_eq!(segments[1].text, "This is a test.");
    }

    #[test]
    fn test_parse_whisper_response_plain_text() {
        let json = serde_json::json!({
            "text": "Just plain text.",
            "duration": 4.0
        });

        let segments = parse_whisper_response(&json).unwrap();
        assert_eq!(segments, vec![TranscriptSegment::new("Just plain text.", 0.0, 4.0)]);
    }

    #[test]
    fn test_parse_whisper_response_empty_segments() {
        let json = serde_json::json!({
            "text": "",
            "segments": [
                {
                    "id": 0,
                    "start": 0.0,
                    "end": 1.0,
                    "text": ""
                }
            ]
        });

        let segments = parse_whisper_response(&json).unwrap();
        assert!(segments.is_empty());
    }

    #[test]
    fn test_parse_whisper_response_unknown() {
        assert!(parse_whisper_response(&serde_json::json!({"error": "x"})).is_err());
    }

    #[test]
    fn test_plan_splits() {
        // 2.5 MB at 24 KB/s is ~105s; three pieces under 1 MB each
        let plan = plan_splits(2_500_000, 1_000_000);
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].0, 0);
        assert_eq!(plan[1].0, plan[0].1);
        assert!(plan.iter().map(|p| p.1).sum::<u64>() >= 105);
    }

    #[test]
    fn test_plan_splits_small_file() {
        assert_eq!(plan_splits(10, 1_000_000).len(), 1);
    }

    #[test]
    fn test_mime_type() {
        assert_eq!(mime_type(Path::new("a.m4a")), "audio/mp4");
        assert_eq!(mime_type(Path::new("a.mp3")), "audio/mpeg");
        assert_eq!(mime_type(Path::new("a.bin")), "application/octet-stream");
    }
}
