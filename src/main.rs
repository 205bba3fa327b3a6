//! papernotes CLI
//!
//! Usage:
//!   papernotes <SOURCE> [--delete-pages 3,7] [--format markdown|json]

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::*;
use papernotes::{
    Config, FallbackPolicy, NotesPipeline, NotesWriter, OutputFormat, PipelineRequest,
    ProgressTracker,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "papernotes")]
#[command(about = "Take page-cited notes on a research paper PDF")]
#[command(version)]
struct Cli {
    /// URL or local path of the PDF
    source: String,

    /// Pages to remove before extraction (1-based, original numbering)
    #[arg(short, long, value_delimiter = ',')]
    delete_pages: Vec<u32>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "markdown")]
    format: Format,

    /// What to do when the model answers without the notes tool
    #[arg(long, value_enum)]
    fallback: Option<Fallback>,

    /// Config file (default: ~/.papernotes/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write notes to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Hide progress spinners
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Markdown,
    Json,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Markdown => OutputFormat::Markdown,
            Format::Json => OutputFormat::Json,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Fallback {
    Fail,
    FreeText,
}

impl From<Fallback> for FallbackPolicy {
    fn from(fallback: Fallback) -> Self {
        match fallback {
            Fallback::Fail => FallbackPolicy::Fail,
            Fallback::FreeText => FallbackPolicy::FreeText,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("papernotes=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\n{} {}", "Error:".red().bold(), e);
            for cause in e.chain().skip(1) {
                eprintln!("  {} {}", "caused by:".dimmed(), cause);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(fallback) = cli.fallback {
        config.fallback = fallback.into();
    }

    // Credentials are checked here, before any network traffic
    let pipeline = NotesPipeline::from_config(&config)?;
    let request = PipelineRequest::new(&cli.source).with_pages_to_delete(cli.delete_pages.iter().copied())?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let mut progress = if cli.quiet {
        ProgressTracker::quiet()
    } else {
        ProgressTracker::new()
    };
    let batch = pipeline
        .run_with_progress(&request, cancel, &mut progress)
        .await?;

    if !batch.rejected.is_empty() {
        eprintln!(
            "{} {} note(s) failed validation",
            "Warning:".yellow().bold(),
            batch.rejected.len()
        );
    }

    let writer = NotesWriter::new(cli.format.into());
    match &cli.output {
        Some(path) => {
            let mut file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            writer.write(&mut file, &cli.source, &batch)?;
            eprintln!(
                "{} {} notes to {}",
                "Wrote".green().bold(),
                batch.notes.len(),
                path.display()
            );
        }
        None => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            writer.write(&mut out, &cli.source, &batch)?;
        }
    }

    Ok(())
}
