use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::llm::create_generator;
use crate::resolve::TranscriptChain;
use crate::summarize::{SummaryResult, Summarizer};
use crate::whisper::{SpeechRecognizer, WhisperRecognizer};
use crate::youtube::{CaptionSource, InnerTubeCaptions};
use crate::ytdlp::{AudioDownloader, SubtitleDownloader, YtDlp};
use crate::{Transcript, TranscriptSource, VideoRef, flatten};

/// Result of one `Pipeline::run`
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub video_id: String,
    pub source: TranscriptSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub plain_text_length: usize,
    pub summary: SummaryResult,
}

/// Download the audio track and run speech recognition over it.
pub struct AudioFallback {
    downloader: Arc<dyn AudioDownloader>,
    recognizer: Arc<dyn SpeechRecognizer>,
    timeout: Duration,
}

impl AudioFallback {
    /// `timeout` bounds the download and the recognition separately.
    pub fn new(downloader: Arc<dyn AudioDownloader>, recognizer: Arc<dyn SpeechRecognizer>, timeout: Duration) -> Self {
        Self {
            downloader,
            recognizer,
            timeout,
        }
    }

    pub async fn transcribe(&self, video: &VideoRef, language_hint: Option<&str>) -> Result<Transcript> {
        let dir = tempfile::Builder::new().prefix("ytdigest-audio-").tempdir()?;

        info!("Downloading audio for {}", video.id);
        let download = self.downloader.download_audio(&video.url, dir.path());
        let audio = match tokio::time::timeout(self.timeout, download).await {
            Ok(Ok(path)) => path,
            Ok(Err(e)) => return Err(Error::DownloadFailure(format!("{e:#}"))),
            Err(_) => {
                return Err(Error::DownloadFailure(format!(
                    "audio download timed out after {:?}",
                    self.timeout
                )));
            }
        };
        if !audio.is_file() {
            return Err(Error::DownloadFailure(format!("no audio file at {}", audio.display())));
        }

        info!("Recognizing speech in {}", audio.display());
        let recognition = self.recognizer.recognize(&audio, language_hint);
        let segments = match tokio::time::timeout(self.timeout, recognition).await {
            Ok(Ok(segments)) => segments,
            Ok(Err(e)) => return Err(Error::RecognitionFailure(format!("{e:#}"))),
            Err(_) => {
                return Err(Error::RecognitionFailure(format!(
                    "speech recognition timed out after {:?}",
                    self.timeout
                )));
            }
        };

        let segments: Vec<_> = segments.into_iter().filter(|s| !s.text.trim().is_empty()).collect();
        if segments.is_empty() {
            return Err(Error::RecognitionFailure("no speech segments recognized".to_string()));
        }

        debug!("Recognized {} segments", segments.len());
        Ok(Transcript {
            video_id: video.id.clone(),
            source: TranscriptSource::SpeechRecognition,
            language: language_hint.map(str::to_string),
            segments,
        })
    }
}

/// URL in, transcript and summary out.
pub struct Pipeline {
    chain: TranscriptChain,
    audio: AudioFallback,
    summarizer: Option<Summarizer>,
    languages: Vec<String>,
    max_chars: usize,
    min_text_chars: usize,
}

impl Pipeline {
    pub fn new(chain: TranscriptChain, audio: AudioFallback, config: &Config) -> Self {
        Self {
            chain,
            audio,
            summarizer: None,
            languages: config.languages.clone(),
            max_chars: config.max_chars,
            min_text_chars: config.min_text_chars,
        }
    }

    pub fn with_summarizer(mut self, summarizer: Summarizer) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Wire the production collaborators: InnerTube captions, yt-dlp, a Whisper server and an LLM.
    pub fn from_config(config: &Config) -> Result<Self> {
        let summarizer = Summarizer::from_config(config, create_generator(config)?);
        Ok(Self::transcriber_from_config(config)?.with_summarizer(summarizer))
    }

    /// Transcript acquisition only; needs no text-generation credentials.
    pub fn transcriber_from_config(config: &Config) -> Result<Self> {
        let captions: Arc<dyn CaptionSource> = Arc::new(InnerTubeCaptions::new(config.call_timeout())?);
        let ytdlp = Arc::new(YtDlp::new().with_cookies(config.cookies_path.clone()));
        let subtitles: Arc<dyn SubtitleDownloader> = ytdlp.clone();
        let downloader: Arc<dyn AudioDownloader> = ytdlp;
        let recognizer: Arc<dyn SpeechRecognizer> =
            Arc::new(WhisperRecognizer::new(&config.whisper, config.recognition_timeout())?);

        let chain = TranscriptChain::from_config(config, captions, subtitles);
        let audio = AudioFallback::new(downloader, recognizer, config.recognition_timeout());
        Ok(Self::new(chain, audio, config))
    }

    /// Resolve a transcript: the caption chain first, then audio when nothing else worked.
    pub async fn transcript(&self, url: &str, languages: &[String], force_audio: bool) -> Result<Transcript> {
        let video = VideoRef::new(url);
        let languages = if languages.is_empty() {
            self.languages.as_slice()
        } else {
            languages
        };
        let hint = languages.first().map(String::as_str);

        if force_audio {
            info!("Skipping captions for {}; audio requested", video.id);
            return self.audio.transcribe(&video, hint).await;
        }

        match self.chain.resolve(&video, languages).await {
            Ok(transcript) => Ok(transcript),
            Err(Error::TranscriptUnavailable { video_id }) => {
                warn!("No captions or subtitles for {video_id}; falling back to speech recognition");
                self.audio.transcribe(&video, hint).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn run(&self, url: &str, languages: &[String], force_audio: bool) -> Result<PipelineOutput> {
        let summarizer = self
            .summarizer
            .as_ref()
            .ok_or_else(|| Error::Config("no text generator configured".to_string()))?;
        let transcript = self.transcript(url, languages, force_audio).await?;

        let text = flatten(&transcript.segments);
        let length = text.chars().count();
        if length < self.min_text_chars {
            return Err(Error::InputTooShort {
                length,
                minimum: self.min_text_chars,
            });
        }

        let chunks = chunk_text(&text, self.max_chars);
        info!("Transcript {} chars in {} chunks", length, chunks.len());
        let summary = summarizer.summarize(&chunks).await?;

        Ok(PipelineOutput {
            video_id: transcript.video_id,
            source: transcript.source,
            language: transcript.language,
            plain_text_length: length,
            summary,
        })
    }
}
