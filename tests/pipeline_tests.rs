use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use ytdigest::config::{Config, RetryConfig, StrategyKind};
use ytdigest::llm::{GenerationError, TextGenerator};
use ytdigest::pipeline::{AudioFallback, Pipeline};
use ytdigest::resolve::TranscriptChain;
use ytdigest::summarize::{Prompts, Summarizer};
use ytdigest::whisper::SpeechRecognizer;
use ytdigest::youtube::{CaptionSource, CaptionTrack};
use ytdigest::ytdlp::{AudioDownloader, SubtitleDownloader};
use ytdigest::{Error, TranscriptSegment, TranscriptSource};

const URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

const TWO_CUES: &str = "WEBVTT\n\n\
                        0:00:01.000 --> 0:00:03.000\nHello world\n\n\
                        0:00:03.000 --> 0:00:05.000\nSecond line\n";

/// Caption source with optional manual and generated tracks
struct Captions {
    manual: Option<&'static str>,
    generated: Option<&'static str>,
}

#[async_trait]
impl CaptionSource for Captions {
    async fn list_tracks(&self, _video_id: &str) -> eyre::Result<Vec<CaptionTrack>> {
        let mut tracks = Vec::new();
        if let Some(text) = self.manual {
            tracks.push(CaptionTrack {
                language_code: "en".into(),
                is_generated: false,
                base_url: text.into(),
            });
        }
        if let Some(text) = self.generated {
            tracks.push(CaptionTrack {
                language_code: "en".into(),
                is_generated: true,
                base_url: text.into(),
            });
        }
        if tracks.is_empty() {
            eyre::bail!("no captions");
        }
        Ok(tracks)
    }

    async fn fetch_track(&self, track: &CaptionTrack) -> eyre::Result<Vec<TranscriptSegment>> {
        Ok(vec![TranscriptSegment::new(track.base_url.clone(), 0.0, 1.0)])
    }
}

struct Subtitles {
    body: Option<&'static str>,
    dirs: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl SubtitleDownloader for Subtitles {
    async fn download_subtitles(
        &self,
        _url: &str,
        _languages: &[String],
        _format: &str,
        dir: &Path,
    ) -> eyre::Result<Vec<PathBuf>> {
        self.dirs.lock().unwrap().push(dir.to_path_buf());
        match self.body {
            Some(body) => {
                let path = dir.join("dQw4w9WgXcQ.en.vtt");
                std::fs::write(&path, body)?;
                Ok(vec![path])
            }
            None => eyre::bail!("There are no subtitles for the requested languages"),
        }
    }
}

struct Audio {
    dirs: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl AudioDownloader for Audio {
    async fn download_audio(&self, _url: &str, dir: &Path) -> eyre::Result<PathBuf> {
        self.dirs.lock().unwrap().push(dir.to_path_buf());
        let path = dir.join("audio.m4a");
        std::fs::write(&path, b"audio")?;
        Ok(path)
    }
}

struct Speech {
    text: &'static str,
    calls: AtomicUsize,
}

#[async_trait]
impl SpeechRecognizer for Speech {
    async fn recognize(&self, _audio: &Path, _language_hint: Option<&str>) -> eyre::Result<Vec<TranscriptSegment>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![TranscriptSegment::new(self.text, 0.0, 10.0)])
    }
}

#[derive(Clone, Default)]
struct CountingGenerator {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl TextGenerator for CountingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("summary {n}"))
    }

    fn name(&self) -> &str {
        "counting"
    }
}

struct Harness {
    subtitles: Arc<Subtitles>,
    audio: Arc<Audio>,
    speech: Arc<Speech>,
    generator: CountingGenerator,
    pipeline: Pipeline,
}

fn harness(
    captions: Captions,
    subtitle_body: Option<&'static str>,
    speech_text: &'static str,
    config: Config,
) -> Harness {
    let subtitles = Arc::new(Subtitles {
        body: subtitle_body,
        dirs: Mutex::new(Vec::new()),
    });
    let audio = Arc::new(Audio {
        dirs: Mutex::new(Vec::new()),
    });
    let speech = Arc::new(Speech {
        text: speech_text,
        calls: AtomicUsize::new(0),
    });
    let generator = CountingGenerator::default();

    let chain = TranscriptChain::from_config(&config, Arc::new(captions), subtitles.clone());
    let fallback = AudioFallback::new(audio.clone(), speech.clone(), Duration::from_secs(5));
    let summarizer = Summarizer::new(
        Box::new(generator.clone()),
        Prompts::default(),
        RetryConfig {
            max_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
        },
        Duration::from_secs(5),
    );
    let pipeline = Pipeline::new(chain, fallback, &config).with_summarizer(summarizer);

    Harness {
        subtitles,
        audio,
        speech,
        generator,
        pipeline,
    }
}

fn langs() -> Vec<String> {
    vec!["en".to_string()]
}

#[tokio::test]
async fn official_captions_win_when_everything_works() {
    let h = harness(
        Captions {
            manual: Some("manual caption text that is long enough"),
            generated: Some("generated caption text that is long enough"),
        },
        Some(TWO_CUES),
        "speech",
        Config::default(),
    );

    let output = h.pipeline.run(URL, &langs(), false).await.unwrap();
    assert_eq!(output.video_id, "dQw4w9WgXcQ");
    assert_eq!(output.source, TranscriptSource::OfficialCaption);
    assert_eq!(output.summary.final_summary, "summary 1");
    assert!(h.subtitles.dirs.lock().unwrap().is_empty());
    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn downloaded_subtitles_parse_two_cues() {
    let h = harness(
        Captions {
            manual: None,
            generated: None,
        },
        Some(TWO_CUES),
        "speech",
        Config::default(),
    );

    let transcript = h.pipeline.transcript(URL, &langs(), false).await.unwrap();
    assert_eq!(transcript.source, TranscriptSource::DownloadedSubtitle);
    assert_eq!(
        transcript.segments,
        vec![
            TranscriptSegment::new("Hello world", 1.0, 3.0),
            TranscriptSegment::new("Second line", 3.0, 5.0),
        ]
    );

    let dirs = h.subtitles.dirs.lock().unwrap();
    assert_eq!(dirs.len(), 1);
    assert!(!dirs[0].exists(), "subtitle temp dir left behind");
}

#[tokio::test]
async fn falls_back_to_audio_when_chain_exhausted() {
    let h = harness(
        Captions {
            manual: None,
            generated: None,
        },
        None,
        "recognized speech from the audio track",
        Config::default(),
    );

    let output = h.pipeline.run(URL, &langs(), false).await.unwrap();
    assert_eq!(output.source, TranscriptSource::SpeechRecognition);
    assert_eq!(output.plain_text_length, "recognized speech from the audio track".len());

    let dirs = h.audio.dirs.lock().unwrap();
    assert_eq!(dirs.len(), 1);
    assert!(!dirs[0].exists(), "audio temp dir left behind");
}

#[tokio::test]
async fn force_audio_skips_captions() {
    let h = harness(
        Captions {
            manual: Some("manual caption text that is long enough"),
            generated: None,
        },
        Some(TWO_CUES),
        "recognized speech from the audio track",
        Config::default(),
    );

    let output = h.pipeline.run(URL, &langs(), true).await.unwrap();
    assert_eq!(output.source, TranscriptSource::SpeechRecognition);
    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 1);
    assert!(h.subtitles.dirs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn short_text_never_reaches_generator() {
    let h = harness(
        Captions {
            manual: Some("too short"),
            generated: None,
        },
        None,
        "speech",
        Config::default(),
    );

    let err = h.pipeline.run(URL, &langs(), false).await.unwrap_err();
    assert!(matches!(err, Error::InputTooShort { length: 9, minimum: 20 }));
    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn long_text_is_chunked_and_merged() {
    let config = Config {
        max_chars: 20,
        min_text_chars: 5,
        strategy_order: vec![StrategyKind::Subtitle],
        ..Config::default()
    };
    let h = harness(
        Captions {
            manual: None,
            generated: None,
        },
        Some(TWO_CUES),
        "speech",
        config,
    );

    // "Hello world\nSecond line" is 23 chars; two chunks plus one merge
    let output = h.pipeline.run(URL, &langs(), false).await.unwrap();
    assert_eq!(output.source, TranscriptSource::DownloadedSubtitle);
    assert_eq!(output.summary.partials.len(), 2);
    assert_eq!(output.summary.final_summary, "summary 3");
    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 3);
}

#[test]
fn production_wiring_needs_no_llm_key() {
    assert!(Pipeline::transcriber_from_config(&Config::default()).is_ok());
    assert!(matches!(Pipeline::from_config(&Config::default()), Err(Error::Config(_))));
}

#[tokio::test]
async fn missing_summarizer_is_config_error() {
    let config = Config::default();
    let chain = TranscriptChain::new(Vec::new(), Duration::from_secs(1));
    let fallback = AudioFallback::new(
        Arc::new(Audio {
            dirs: Mutex::new(Vec::new()),
        }),
        Arc::new(Speech {
            text: "x",
            calls: AtomicUsize::new(0),
        }),
        Duration::from_secs(1),
    );
    let pipeline = Pipeline::new(chain, fallback, &config);

    let err = pipeline.run(URL, &langs(), false).await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
