use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;

use crate::chunk::Chunk;
use crate::config::{Config, RetryConfig};
use crate::error::{Error, Result};
use crate::llm::{GenerationError, TextGenerator};

const DEFAULT_PARTIAL_PROMPT: &str = "This is part {index} of {total} of a video transcript.
Summarize only the essential points of this part as 3 to 6 bullet points, written in {language}.
Leave out filler and rhetoric.

Transcript part:
{chunk}
";

const DEFAULT_FINAL_PROMPT: &str = "Below are partial summaries of a video transcript, in order.
Merge them into one final summary written in {language}, using exactly these sections:

Summary (at most 5 bullets)
Key points
Evidence & data
Caveats
Takeaways

Do not repeat the same point in more than one section.

Partial summaries:
{partials}
";

/// Prompt templates for the two summarization passes.
///
/// `partial` is rendered once per chunk with `{index}`, `{total}` and `{chunk}`;
/// `final_merge` once with `{partials}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompts {
    pub partial: String,
    pub final_merge: String,
}

impl Prompts {
    /// Default templates asking for output in `language`.
    pub fn for_language(language: &str) -> Self {
        Self {
            partial: DEFAULT_PARTIAL_PROMPT.replace("{language}", language),
            final_merge: DEFAULT_FINAL_PROMPT.replace("{language}", language),
        }
    }
}

impl Default for Prompts {
    fn default() -> Self {
        Self::for_language("English")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialSummary {
    pub chunk_index: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryResult {
    pub partials: Vec<PartialSummary>,
    #[serde(rename = "final")]
    pub final_summary: String,
}

pub fn render_partial_prompt(template: &str, chunk: &Chunk) -> String {
    template
        .replace("{index}", &chunk.index.to_string())
        .replace("{total}", &chunk.total.to_string())
        .replace("{chunk}", &chunk.content)
}

/// Render the merge prompt; identical partials always yield an identical prompt.
pub fn build_final_prompt(template: &str, partials: &[PartialSummary]) -> String {
    let total = partials.len();
    let joined = partials
        .iter()
        .enumerate()
        .map(|(i, p)| format!("[Part {}/{}]\n{}", i + 1, total, p.text))
        .collect::<Vec<_>>()
        .join("\n\n");
    template.replace("{partials}", &joined)
}

/// Map-then-merge summarization over a text generator.
pub struct Summarizer {
    generator: Box<dyn TextGenerator>,
    prompts: Prompts,
    retry: RetryConfig,
    timeout: Duration,
}

impl Summarizer {
    pub fn new(generator: Box<dyn TextGenerator>, prompts: Prompts, retry: RetryConfig, timeout: Duration) -> Self {
        Self {
            generator,
            prompts,
            retry,
            timeout,
        }
    }

    pub fn from_config(config: &Config, generator: Box<dyn TextGenerator>) -> Self {
        Self::new(
            generator,
            Prompts::for_language(&config.summary_language),
            config.retry.clone(),
            config.call_timeout(),
        )
    }

    pub async fn summarize(&self, chunks: &[Chunk]) -> Result<SummaryResult> {
        if chunks.is_empty() {
            return Err(Error::SummarizationFailure(GenerationError::Fatal("empty input".to_string())));
        }

        let mut partials = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            info!("Summarizing part {}/{} ({} chars)", chunk.index, chunk.total, chunk.size());
            let prompt = render_partial_prompt(&self.prompts.partial, chunk);
            let text = self.generate(&prompt).await.map_err(Error::SummarizationFailure)?;
            partials.push(PartialSummary {
                chunk_index: chunk.index,
                text,
            });
        }

        if partials.len() == 1 {
            let final_summary = partials[0].text.clone();
            return Ok(SummaryResult {
                partials,
                final_summary,
            });
        }

        info!("Merging {} partial summaries", partials.len());
        let prompt = build_final_prompt(&self.prompts.final_merge, &partials);
        let final_summary = self.generate(&prompt).await.map_err(Error::SummarizationFailure)?;

        Ok(SummaryResult {
            partials,
            final_summary,
        })
    }

    /// One generation with timeout and backoff; only transient failures are retried.
    async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = match tokio::time::timeout(self.timeout, self.generator.generate(prompt)).await {
                Ok(result) => result,
                Err(_) => Err(GenerationError::Transient(format!(
                    "{} gave no response within {:?}",
                    self.generator.name(),
                    self.timeout
                ))),
            };

            match result {
                Ok(text) => {
                    debug!("{} answered on attempt {attempt}", self.generator.name());
                    return Ok(text);
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!("Attempt {attempt}/{max_attempts} failed ({e}); retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
