use thiserror::Error;

use crate::llm::GenerationError;

/// Failures surfaced by the transcript/summary pipeline.
#[derive(Error, Debug)]
pub enum Error {
    #[error("no transcript available for video {video_id}")]
    TranscriptUnavailable { video_id: String },

    #[error("download failed: {0}")]
    DownloadFailure(String),

    #[error("speech recognition failed: {0}")]
    RecognitionFailure(String),

    #[error("summarization failed: {0}")]
    SummarizationFailure(#[source] GenerationError),

    #[error("transcript too short ({length} chars, need at least {minimum})")]
    InputTooShort { length: usize, minimum: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Process exit code for the CLI, distinct per failure class.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::TranscriptUnavailable { .. } => 3,
            Error::DownloadFailure(_) => 4,
            Error::RecognitionFailure(_) => 5,
            Error::SummarizationFailure(_) => 6,
            Error::InputTooShort { .. } => 7,
            Error::Config(_) => 78,
            Error::Io(_) => 74,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
