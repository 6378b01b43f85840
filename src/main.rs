//! Command-line entry point — csv-to-speech.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Dispatch the subcommand: `inspect`, `batch`, `preview` or `config`.
//!
//! The `batch` subcommand spawns the worker through [`BatchProcessor`],
//! prints the event stream, and wires Ctrl-C to the run's cancellation
//! token so an interrupted run still delivers its partial results.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use csv_to_speech::batch::{BatchEvent, BatchProcessor, Job, PreviewRequest, ResultRecord, RunPhase};
use csv_to_speech::config::{AppConfig, AppPaths, MODELS, VOICES};
use csv_to_speech::export::export_results;
use csv_to_speech::source::{find_csv_files, inspect};
use csv_to_speech::speech::{ApiSynthesizerFactory, OutputFormat};

/// Longest text a preview call will speak.
const PREVIEW_MAX_CHARS: usize = 500;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "csv-to-speech",
    version,
    about = "Convert CSV text columns to speech via an OpenAI-compatible API"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show a CSV file's columns and a short preview of its rows
    Inspect {
        /// CSV file to inspect
        file: PathBuf,
        /// Show the preview text of this column instead of the row grid
        #[arg(long)]
        column: Option<usize>,
    },

    /// Synthesize one audio file per non-empty cell of a CSV column
    Batch {
        /// CSV files, or directories containing CSV files
        inputs: Vec<PathBuf>,
        /// Zero-based column to synthesize
        #[arg(long)]
        column: usize,
        /// Directory for produced audio files
        #[arg(long)]
        out: PathBuf,
        /// Voice override (default from settings)
        #[arg(long)]
        voice: Option<String>,
        /// Model override (default from settings)
        #[arg(long)]
        model: Option<String>,
        /// Voice style instructions (advanced model only)
        #[arg(long)]
        instructions: Option<String>,
        /// Output format override: mp3, opus, aac or flac
        #[arg(long)]
        format: Option<OutputFormat>,
        /// Copy produced files to this directory after completion
        #[arg(long)]
        export_to: Option<PathBuf>,
    },

    /// Synthesize a single text snippet into the temp directory
    Preview {
        /// Text to speak (truncated to 500 characters)
        #[arg(long)]
        text: String,
        #[arg(long)]
        voice: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        instructions: Option<String>,
    },

    /// Show the resolved configuration
    Config {
        /// Write a default settings.toml if none exists
        #[arg(long)]
        init: bool,
    },
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    match cli.command {
        Command::Inspect { file, column } => cmd_inspect(&file, column),
        Command::Batch {
            inputs,
            column,
            out,
            voice,
            model,
            instructions,
            format,
            export_to,
        } => {
            cmd_batch(
                &config,
                &inputs,
                column,
                out,
                voice,
                model,
                instructions,
                format,
                export_to,
            )
            .await
        }
        Command::Preview {
            text,
            voice,
            model,
            instructions,
        } => cmd_preview(&config, text, voice, model, instructions).await,
        Command::Config { init } => cmd_config(&config, init),
    }
}

// ---------------------------------------------------------------------------
// inspect
// ---------------------------------------------------------------------------

fn cmd_inspect(file: &Path, column: Option<usize>) -> Result<()> {
    let summary = inspect(file)?;

    println!("Columns ({}):", summary.headers.len());
    for (index, header) in summary.headers.iter().enumerate() {
        println!("  [{index}] {header}");
    }

    match column {
        Some(index) => {
            if index >= summary.headers.len() {
                bail!(
                    "column {index} is out of range — {} has {} column(s)",
                    file.display(),
                    summary.headers.len()
                );
            }
            println!();
            println!("{}", summary.preview_text(index));
        }
        None => {
            println!();
            println!("First {} row(s):", summary.preview.len());
            for row in &summary.preview {
                println!("  {}", row.join(" | "));
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// batch
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
async fn cmd_batch(
    config: &AppConfig,
    inputs: &[PathBuf],
    column: usize,
    out: PathBuf,
    voice: Option<String>,
    model: Option<String>,
    instructions: Option<String>,
    format: Option<OutputFormat>,
    export_to: Option<PathBuf>,
) -> Result<()> {
    let files = resolve_inputs(inputs)?;
    std::fs::create_dir_all(&out)?;

    let voice = voice.unwrap_or_else(|| config.tts.default_voice.clone());
    let model = model.unwrap_or_else(|| config.tts.default_model.clone());
    let format = format.unwrap_or(config.tts.output_format);

    let jobs: Vec<Job> = files
        .iter()
        .map(|file| Job {
            source_path: file.clone(),
            column_index: column,
            voice: voice.clone(),
            model: model.clone(),
            instructions: instructions.clone(),
            output_dir: out.clone(),
            format,
        })
        .collect();
    log::info!("starting batch run over {} file(s)", jobs.len());

    let (events_tx, events_rx) = mpsc::channel(32);
    let factory = Arc::new(ApiSynthesizerFactory::new(config.api.clone()));
    let mut processor = BatchProcessor::new(factory, events_tx);

    let token = processor.start_batch(jobs).await;
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("stop requested; finishing the in-flight request");
            token.cancel();
        }
    });
    let printer = tokio::spawn(print_events(events_rx));

    let phase = processor.wait().await;
    ctrl_c.abort();
    // Dropping the processor closes the event channel so the printer can
    // observe a run that ended without a terminal event.
    drop(processor);

    let outcome = printer.await.map_err(|e| anyhow!("event task failed: {e}"))?;

    match outcome {
        Some((cancelled, results)) => {
            let verb = if cancelled { "Stopped" } else { "Completed" };
            println!("{verb}: {} file(s) produced in {}", results.len(), out.display());
            if let Some(dest) = export_to {
                let copied = export_results(&results, &dest)?;
                println!("Exported {copied} file(s) to {}", dest.display());
            }
            Ok(())
        }
        None => {
            debug_assert_eq!(phase, Some(RunPhase::Failed));
            bail!("batch run failed before producing any results")
        }
    }
}

/// Render the event stream until the run's terminal event (or channel
/// close), returning `(was_cancelled, results)` when one arrived.
async fn print_events(
    mut events_rx: mpsc::Receiver<BatchEvent>,
) -> Option<(bool, Vec<ResultRecord>)> {
    while let Some(event) = events_rx.recv().await {
        match event {
            BatchEvent::Progress {
                completed,
                total,
                message,
            } => {
                let percent = if total > 0 {
                    completed / total as f64 * 100.0
                } else {
                    100.0
                };
                println!("[{percent:5.1}%] {message}");
            }
            BatchEvent::Error { title, message } => eprintln!("{title}: {message}"),
            BatchEvent::Completed { results } => return Some((false, results)),
            BatchEvent::Cancelled { results } => return Some((true, results)),
            BatchEvent::PreviewReady { .. } => {}
        }
    }
    None
}

/// Expand directory arguments into their CSV files.
fn resolve_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    if inputs.is_empty() {
        bail!("no input files given");
    }

    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let found = find_csv_files(input)?;
            if found.is_empty() {
                bail!("no CSV files found in {}", input.display());
            }
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

// ---------------------------------------------------------------------------
// preview
// ---------------------------------------------------------------------------

async fn cmd_preview(
    config: &AppConfig,
    text: String,
    voice: Option<String>,
    model: Option<String>,
    instructions: Option<String>,
) -> Result<()> {
    let text = truncate_chars(&text, PREVIEW_MAX_CHARS);
    if text.is_empty() {
        bail!("no text to preview");
    }

    let (events_tx, mut events_rx) = mpsc::channel(8);
    let factory = Arc::new(ApiSynthesizerFactory::new(config.api.clone()));
    let processor = BatchProcessor::new(factory, events_tx)
        .with_temp_dir(AppPaths::new().temp_dir);

    let handle = processor.generate_preview(PreviewRequest {
        text: text.to_string(),
        voice: voice.unwrap_or_else(|| config.tts.default_voice.clone()),
        model: model.unwrap_or_else(|| config.tts.default_model.clone()),
        instructions,
        format: config.tts.output_format,
    });
    handle.await.map_err(|e| anyhow!("preview task failed: {e}"))?;
    drop(processor);

    while let Some(event) = events_rx.recv().await {
        match event {
            BatchEvent::PreviewReady { path } => {
                println!("Preview written to {}", path.display());
                return Ok(());
            }
            BatchEvent::Error { title, message } => bail!("{title}: {message}"),
            _ => {}
        }
    }
    bail!("preview produced no result")
}

/// Slice off everything past `max_chars` characters (not bytes).
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config(config: &AppConfig, init: bool) -> Result<()> {
    let paths = AppPaths::new();

    if init {
        if paths.settings_file.exists() {
            println!("Settings already exist at {}", paths.settings_file.display());
        } else {
            config.save_to(&paths.settings_file)?;
            println!("Wrote {}", paths.settings_file.display());
        }
    }

    println!("Settings file: {}", paths.settings_file.display());
    println!("Endpoint:      {}", config.api.endpoint);
    println!(
        "API key:       {}",
        if config.api.api_key.is_empty() {
            "(not set)"
        } else {
            "(set)"
        }
    );
    println!("Timeout:       {} ms", config.api.timeout_ms);
    println!("Voice:         {}", config.tts.default_voice);
    println!("Model:         {}", config.tts.default_model);
    println!("Format:        {}", config.tts.output_format);
    println!("Known voices:  {}", VOICES.join(", "));
    println!("Known models:  {}", MODELS.join(", "));

    Ok(())
}
