use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};

use crate::config::{Config, StrategyKind};
use crate::error::{Error, Result};
use crate::vtt::parse_vtt;
use crate::youtube::{CaptionSource, manual_track};
use crate::ytdlp::SubtitleDownloader;
use crate::{Transcript, TranscriptSegment, TranscriptSource, VideoRef};

/// Subtitle markup requested from the downloader
const SUBTITLE_FORMAT: &str = "vtt";

/// Regional variants requested alongside a base language code
const REGIONAL_VARIANTS: &[(&str, &[&str])] = &[
    ("ko", &["ko-KR"]),
    ("en", &["en-US", "en-GB"]),
    ("ja", &["ja-JP"]),
    ("zh", &["zh-Hans", "zh-Hant", "zh-CN", "zh-TW"]),
    ("es", &["es-ES", "es-419"]),
    ("pt", &["pt-BR", "pt-PT"]),
    ("fr", &["fr-FR", "fr-CA"]),
    ("de", &["de-DE"]),
];

/// Segments produced by one successful strategy attempt
#[derive(Debug, Clone)]
pub struct Attempt {
    pub segments: Vec<TranscriptSegment>,
    pub language: Option<String>,
}

/// One way of acquiring a transcript. Failures stay local: `None` means "try the next one".
#[async_trait]
pub trait TranscriptStrategy: Send + Sync {
    fn source(&self) -> TranscriptSource;

    async fn attempt(&self, video: &VideoRef, languages: &[String]) -> Option<Attempt>;
}

/// Manually created captions, one exact language at a time in priority order.
pub struct OfficialCaptionStrategy {
    captions: Arc<dyn CaptionSource>,
}

impl OfficialCaptionStrategy {
    pub fn new(captions: Arc<dyn CaptionSource>) -> Self {
        Self { captions }
    }
}

#[async_trait]
impl TranscriptStrategy for OfficialCaptionStrategy {
    fn source(&self) -> TranscriptSource {
        TranscriptSource::OfficialCaption
    }

    async fn attempt(&self, video: &VideoRef, languages: &[String]) -> Option<Attempt> {
        let tracks = match self.captions.list_tracks(&video.id).await {
            Ok(tracks) => tracks,
            Err(e) => {
                debug!("Listing caption tracks failed: {e}");
                return None;
            }
        };

        for lang in languages {
            let Some(track) = manual_track(&tracks, lang) else {
                debug!("No official {lang} captions for {}", video.id);
                continue;
            };
            match self.captions.fetch_track(track).await {
                Ok(segments) if !segments.is_empty() => {
                    return Some(Attempt {
                        segments,
                        language: Some(lang.clone()),
                    });
                }
                Ok(_) => debug!("Official {lang} captions for {} are empty", video.id),
                Err(e) => debug!("Official {lang} captions unavailable: {e}"),
            }
        }
        None
    }
}

/// The first auto-generated caption track, whatever its language.
pub struct AutoCaptionStrategy {
    captions: Arc<dyn CaptionSource>,
}

impl AutoCaptionStrategy {
    pub fn new(captions: Arc<dyn CaptionSource>) -> Self {
        Self { captions }
    }
}

#[async_trait]
impl TranscriptStrategy for AutoCaptionStrategy {
    fn source(&self) -> TranscriptSource {
        TranscriptSource::AutoCaption
    }

    async fn attempt(&self, video: &VideoRef, _languages: &[String]) -> Option<Attempt> {
        let tracks = match self.captions.list_tracks(&video.id).await {
            Ok(tracks) => tracks,
            Err(e) => {
                debug!("Listing caption tracks failed: {e}");
                return None;
            }
        };

        let track = tracks.iter().find(|t| t.is_generated)?;
        match self.captions.fetch_track(track).await {
            Ok(segments) if !segments.is_empty() => Some(Attempt {
                segments,
                language: Some(track.language_code.clone()),
            }),
            Ok(_) => None,
            Err(e) => {
                debug!("Auto-generated {} captions failed: {e}", track.language_code);
                None
            }
        }
    }
}

/// Subtitle files fetched by a downloader into a scoped temp dir, then parsed.
pub struct DownloadedSubtitleStrategy {
    downloader: Arc<dyn SubtitleDownloader>,
    extra_languages: Vec<String>,
}

impl DownloadedSubtitleStrategy {
    pub fn new(downloader: Arc<dyn SubtitleDownloader>, extra_languages: Vec<String>) -> Self {
        Self {
            downloader,
            extra_languages,
        }
    }
}

#[async_trait]
impl TranscriptStrategy for DownloadedSubtitleStrategy {
    fn source(&self) -> TranscriptSource {
        TranscriptSource::DownloadedSubtitle
    }

    async fn attempt(&self, video: &VideoRef, languages: &[String]) -> Option<Attempt> {
        // Removed on drop, whichever way this returns
        let dir = match tempfile::Builder::new().prefix("ytdigest-subs-").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                warn!("Could not create subtitle temp dir: {e}");
                return None;
            }
        };

        let requested = requested_languages(languages, &self.extra_languages);
        let files = match self
            .downloader
            .download_subtitles(&video.url, &requested, SUBTITLE_FORMAT, dir.path())
            .await
        {
            Ok(files) => files,
            Err(e) => {
                debug!("Subtitle download failed: {e:#}");
                return None;
            }
        };

        for path in selection_order(&files, languages) {
            let contents = match tokio::fs::read(&path).await {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    debug!("Could not read {}: {e}", path.display());
                    continue;
                }
            };
            let segments = parse_vtt(&contents);
            if !segments.is_empty() {
                debug!("Using subtitle file {}", path.display());
                return Some(Attempt {
                    segments,
                    language: subtitle_language(&path),
                });
            }
        }
        None
    }
}

/// Priority languages with their regional variants, then the fixed extras; no duplicates.
pub fn requested_languages(priority: &[String], extras: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |code: &str| {
        if !code.is_empty() && !out.iter().any(|c| c == code) {
            out.push(code.to_string());
        }
    };

    for code in priority {
        push(code.as_str());
        if let Some((_, variants)) = REGIONAL_VARIANTS.iter().find(|(base, _)| *base == code.as_str()) {
            for variant in variants.iter() {
                push(*variant);
            }
        }
    }
    for code in extras {
        push(code.as_str());
    }
    out
}

/// Files matching a priority language first (in priority order), then the first file.
fn selection_order(files: &[PathBuf], languages: &[String]) -> Vec<PathBuf> {
    let mut order: Vec<PathBuf> = Vec::new();
    for lang in languages {
        if let Some(p) = files.iter().find(|p| subtitle_language(p).as_deref() == Some(lang.as_str())) {
            if !order.contains(p) {
                order.push(p.clone());
            }
        }
    }
    if let Some(first) = files.first() {
        if !order.contains(first) {
            order.push(first.clone());
        }
    }
    order
}

/// Language tag from a `<id>.<lang>.<ext>` file name.
fn subtitle_language(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let (_, lang) = stem.rsplit_once('.')?;
    Some(lang.to_string())
}

/// Ordered strategies; the first one to produce text wins.
pub struct TranscriptChain {
    strategies: Vec<Box<dyn TranscriptStrategy>>,
    timeout: Duration,
}

impl TranscriptChain {
    pub fn new(strategies: Vec<Box<dyn TranscriptStrategy>>, timeout: Duration) -> Self {
        Self { strategies, timeout }
    }

    /// Build the chain in `config.strategy_order`.
    pub fn from_config(
        config: &Config,
        captions: Arc<dyn CaptionSource>,
        subtitles: Arc<dyn SubtitleDownloader>,
    ) -> Self {
        let strategies = config
            .strategy_order
            .iter()
            .map(|kind| -> Box<dyn TranscriptStrategy> {
                match kind {
                    StrategyKind::Official => Box::new(OfficialCaptionStrategy::new(captions.clone())),
                    StrategyKind::Auto => Box::new(AutoCaptionStrategy::new(captions.clone())),
                    StrategyKind::Subtitle => Box::new(DownloadedSubtitleStrategy::new(
                        subtitles.clone(),
                        config.extra_subtitle_languages.clone(),
                    )),
                }
            })
            .collect();
        Self::new(strategies, config.call_timeout())
    }

    pub fn sources(&self) -> Vec<TranscriptSource> {
        self.strategies.iter().map(|s| s.source()).collect()
    }

    pub async fn resolve(&self, video: &VideoRef, languages: &[String]) -> Result<Transcript> {
        for strategy in &self.strategies {
            let source = strategy.source();
            debug!("Trying {source} for {}", video.id);

            match tokio::time::timeout(self.timeout, strategy.attempt(video, languages)).await {
                Ok(Some(attempt)) if attempt.segments.iter().any(|s| !s.text.trim().is_empty()) => {
                    info!("Transcript for {} from {source} ({} segments)", video.id, attempt.segments.len());
                    return Ok(Transcript {
                        video_id: video.id.clone(),
                        source,
                        language: attempt.language,
                        segments: attempt.segments,
                    });
                }
                Ok(_) => debug!("{source} produced nothing for {}", video.id),
                Err(_) => warn!("{source} timed out after {:?} for {}", self.timeout, video.id),
            }
        }

        Err(Error::TranscriptUnavailable {
            video_id: video.id.clone(),
        })
    }
}
