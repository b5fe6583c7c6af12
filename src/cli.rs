use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(
    name = "ytdigest",
    about = "YouTube transcript summarizer",
    version = env!("GIT_DESCRIBE"),
)]
pub struct Cli {
    /// YouTube video URL or video ID (reads from stdin if omitted)
    pub url: Option<String>,

    /// Caption language in priority order; repeat for fallbacks (default from config: ko, en)
    #[arg(short, long = "lang", value_name = "LANG")]
    pub lang: Vec<String>,

    /// Skip captions and subtitles, always transcribe the audio
    #[arg(long)]
    pub force_audio: bool,

    /// LLM model for summarization (claude-*, gemini-*, or an OpenAI model)
    #[arg(long)]
    pub model: Option<String>,

    /// Maximum characters per summarized chunk
    #[arg(long)]
    pub max_chars: Option<usize>,

    /// Output format: text (default), json
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Write output to file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the transcript and stop; no summary
    #[arg(long)]
    pub transcript_only: bool,

    /// Show transcript source and progress on stderr
    #[arg(short, long)]
    pub verbose: bool,
}
