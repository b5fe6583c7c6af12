use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::Command;

use eyre::{Result, bail};
use log::{debug, info};

use ytdigest::config::{Config, config_path};
use ytdigest::pipeline::Pipeline;

mod cli;

use cli::{Cli, OutputFormat};

fn setup_logging() -> Result<()> {
    let log_dir = log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let log_file = log_dir.join("ytdigest.log");

    let target = Box::new(std::fs::OpenOptions::new().create(true).append(true).open(&log_file)?);

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized: {}", log_file.display());
    Ok(())
}

fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ytdigest")
        .join("logs")
}

fn tool_version(name: &str, flag: &str) -> Option<String> {
    Command::new(name)
        .arg(flag)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| {
            String::from_utf8_lossy(&o.stdout)
                .trim()
                .lines()
                .next()
                .unwrap_or("")
                .to_string()
        })
}

fn tool_line(name: &str, flag: &str, purpose: &str) -> String {
    match tool_version(name, flag) {
        Some(v) => format!("  \x1b[32m✅\x1b[0m {name:<10} {v}"),
        None => format!("  \x1b[31m❌\x1b[0m {name:<10} (not found; needed for {purpose})"),
    }
}

fn build_after_help() -> String {
    let yt_dlp_line = tool_line("yt-dlp", "--version", "subtitle and audio downloads");
    let ffmpeg_line = tool_line("ffmpeg", "-version", "audio extraction and splitting");

    format!(
        "\nREQUIRED TOOLS:\n{yt_dlp_line}\n{ffmpeg_line}\n\nConfig is read from: {}\nLogs are written to: {}",
        config_path().display(),
        log_dir().join("ytdigest.log").display()
    )
}

/// Message shown for a pipeline failure; each failure class reads differently.
fn describe(err: &ytdigest::Error) -> String {
    use ytdigest::Error;

    match err {
        Error::InputTooShort { length, minimum } => format!(
            "The transcript is too short to summarize ({length} characters, at least {minimum} needed).\n\
             Try --transcript-only to see what was found."
        ),
        Error::Config(msg) => format!("Configuration error: {msg}\nConfig file: {}", config_path().display()),
        Error::TranscriptUnavailable { video_id } => format!("No transcript could be obtained for video {video_id}."),
        Error::DownloadFailure(msg) => format!("Audio download failed: {msg}"),
        Error::RecognitionFailure(msg) => format!("Speech recognition failed: {msg}"),
        Error::SummarizationFailure(e) => format!("The summarization service failed: {e}"),
        Error::Io(e) => format!("I/O error: {e}"),
    }
}

fn load_config(cli: &Cli) -> ytdigest::Result<Config> {
    let mut config = Config::load()?;

    if !cli.lang.is_empty() {
        config.languages = cli.lang.clone();
    }
    if let Some(ref model) = cli.model {
        config.model = model.clone();
    }
    if let Some(max_chars) = cli.max_chars {
        config.max_chars = max_chars;
    }

    config.validate()?;
    Ok(config)
}

fn emit(cli: &Cli, rendered: &str) -> Result<()> {
    if let Some(ref path) = cli.output {
        std::fs::write(path, rendered)?;
        if cli.verbose {
            eprintln!("Output written to: {}", path.display());
        }
    } else {
        println!("{rendered}");
    }
    Ok(())
}

async fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    debug!("Config: languages={:?} model={} max_chars={}", config.languages, config.model, config.max_chars);

    if cli.verbose {
        let path = config_path();
        if path.exists() {
            eprintln!("Config: {}", path.display());
        }
    }

    let pipeline = if cli.transcript_only {
        Pipeline::transcriber_from_config(&config)?
    } else {
        Pipeline::from_config(&config)?
    };

    // Collect URLs: from arg or stdin
    let urls = if let Some(ref url) = cli.url {
        vec![url.clone()]
    } else {
        let stdin = io::stdin();
        stdin.lock().lines().collect::<Result<Vec<_>, _>>()?
    };

    if urls.iter().all(|u| u.trim().is_empty()) {
        bail!("no URL or video ID provided\n\nUsage: ytdigest <URL>\n       echo <URL> | ytdigest");
    }

    for url_input in urls.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
        if cli.transcript_only {
            let transcript = pipeline.transcript(url_input, &config.languages, cli.force_audio).await?;
            if cli.verbose {
                eprintln!(
                    "Video: {}\nSource: {}\nLanguage: {}\nSegments: {}",
                    transcript.video_id,
                    transcript.source,
                    transcript.language.as_deref().unwrap_or("unknown"),
                    transcript.segments.len(),
                );
            }
            emit(cli, &ytdigest::output::render_transcript(&transcript))?;
            continue;
        }

        if cli.verbose {
            eprintln!("Summarizing {url_input} with {}...", config.model);
        }
        let output = pipeline.run(url_input, &config.languages, cli.force_audio).await?;

        if cli.verbose {
            eprintln!(
                "Video: {}\nSource: {}\nLanguage: {}\nText: {} chars in {} parts",
                output.video_id,
                output.source,
                output.language.as_deref().unwrap_or("unknown"),
                output.plain_text_length,
                output.summary.partials.len(),
            );
        }

        let rendered = match cli.format {
            OutputFormat::Text => ytdigest::output::render_text(&output),
            OutputFormat::Json => ytdigest::output::render_json(&output),
        };
        emit(cli, &rendered)?;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging()?;

    let after_help = build_after_help();
    let cmd = <Cli as clap::CommandFactory>::command().after_help(after_help);
    let matches = cmd.get_matches();
    let cli = <Cli as clap::FromArgMatches>::from_arg_matches(&matches)?;

    if let Err(report) = run(&cli).await {
        if let Some(err) = report.downcast_ref::<ytdigest::Error>() {
            log::error!("{err}");
            eprintln!("Error: {}", describe(err));
            std::process::exit(err.exit_code());
        }
        return Err(report);
    }

    Ok(())
}
