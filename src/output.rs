use crate::pipeline::PipelineOutput;
use crate::{Transcript, flatten};

/// Render transcript as plain text (one segment per line, no timestamps)
pub fn render_transcript(transcript: &Transcript) -> String {
    flatten(&transcript.segments)
}

/// Render the final summary, with the per-part summaries after it when there are several.
pub fn render_text(output: &PipelineOutput) -> String {
    let mut out = output.summary.final_summary.trim().to_string();

    let partials = &output.summary.partials;
    if partials.len() > 1 {
        out.push_str("\n\n--- Partial summaries ---");
        for p in partials {
            out.push_str(&format!("\n\n[Part {}/{}]\n{}", p.chunk_index, partials.len(), p.text.trim()));
        }
    }
    out
}

pub fn render_json(output: &PipelineOutput) -> String {
    serde_json::to_string_pretty(output).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}
