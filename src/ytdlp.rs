use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use eyre::{Result, bail};
use log::{debug, warn};
use tokio::process::Command;

use crate::youtube::USER_AGENT;

/// Audio extensions yt-dlp may leave behind, most preferred first
const AUDIO_EXTENSIONS: &[&str] = &["m4a", "mp3", "wav", "aac", "m4b", "opus", "webm"];

/// Writes subtitle files for a video into a directory.
#[async_trait]
pub trait SubtitleDownloader: Send + Sync {
    /// Returns the written files; names carry the language (`<id>.<lang>.<format>`).
    async fn download_subtitles(&self, url: &str, languages: &[String], format: &str, dir: &Path)
    -> Result<Vec<PathBuf>>;
}

/// Downloads the best available audio track of a video.
#[async_trait]
pub trait AudioDownloader: Send + Sync {
    async fn download_audio(&self, url: &str, dir: &Path) -> Result<PathBuf>;
}

/// yt-dlp subprocess wrapper
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: String,
    cookies: Option<PathBuf>,
}

impl Default for YtDlp {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
            cookies: None,
        }
    }
}

impl YtDlp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a Netscape cookies file when it exists.
    pub fn with_cookies(mut self, path: Option<PathBuf>) -> Self {
        self.cookies = path.filter(|p| {
            let exists = p.exists();
            if !exists {
                warn!("Cookies file not found, ignoring: {}", p.display());
            }
            exists
        });
        self
    }

    fn common_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "--no-playlist",
            "--quiet",
            "--no-warnings",
            "--retries",
            "3",
            "--user-agent",
            USER_AGENT,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        if let Some(ref cookies) = self.cookies {
            args.push("--cookies".to_string());
            args.push(cookies.to_string_lossy().to_string());
        }
        args
    }

    fn subtitle_args(&self, url: &str, languages: &[String], format: &str, dir: &Path) -> Vec<String> {
        let langs = languages.join(",");
        let template = dir.join("%(id)s.%(ext)s").to_string_lossy().to_string();
        let mut args = self.common_args();
        args.extend(
            [
                "--skip-download",
                "--write-subs",
                "--write-auto-subs",
                "--sub-langs",
                langs.as_str(),
                "--sub-format",
                format,
                "-o",
                template.as_str(),
                url,
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args
    }

    fn audio_args(&self, url: &str, dir: &Path) -> Vec<String> {
        let template = dir.join("audio.%(ext)s").to_string_lossy().to_string();
        let mut args = self.common_args();
        args.extend(
            [
                "--format",
                "bestaudio/best",
                "--extract-audio",
                "--audio-format",
                "m4a",
                "--audio-quality",
                "192K",
                "-o",
                template.as_str(),
                url,
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args
    }

    async fn run(&self, args: &[String]) -> Result<std::process::Output> {
        debug!("Running {} {}", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(o) => Ok(o),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                bail!(
                    "{} not found. Install it to enable subtitle and audio downloads:\n  \
                     pip install yt-dlp\n  \
                     or: brew install yt-dlp",
                    self.program
                );
            }
            Err(e) => bail!("failed to run {}: {e}", self.program),
        }
    }
}

#[async_trait]
impl SubtitleDownloader for YtDlp {
    async fn download_subtitles(
        &self,
        url: &str,
        languages: &[String],
        format: &str,
        dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let output = self.run(&self.subtitle_args(url, languages, format, dir)).await?;
        let files = list_files(dir, format)?;

        // Some requested languages failing still exits non-zero; keep whatever was written
        if !output.status.success() {
            if files.is_empty() {
                bail!("yt-dlp exited with status {}: {}", output.status, stderr_tail(&output.stderr));
            }
            warn!("yt-dlp exited with status {} but wrote {} subtitle files", output.status, files.len());
        }

        debug!("Downloaded {} subtitle files", files.len());
        Ok(files)
    }
}

#[async_trait]
impl AudioDownloader for YtDlp {
    async fn download_audio(&self, url: &str, dir: &Path) -> Result<PathBuf> {
        let output = self.run(&self.audio_args(url, dir)).await?;
        if !output.status.success() {
            bail!("yt-dlp exited with status {}: {}", output.status, stderr_tail(&output.stderr));
        }

        find_audio_file(dir)
    }
}

/// Files in `dir` with extension `ext`, sorted by name.
pub fn list_files(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some(ext))
        .collect();
    files.sort();
    Ok(files)
}

fn find_audio_file(dir: &Path) -> Result<PathBuf> {
    for ext in AUDIO_EXTENSIONS {
        if let Some(path) = list_files(dir, ext)?.into_iter().next() {
            debug!("Audio file: {}", path.display());
            return Ok(path);
        }
    }
    bail!("yt-dlp did not produce an audio file in {}", dir.display());
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(3)..].join(" | ")
}
