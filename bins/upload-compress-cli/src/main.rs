//! upcompress: compress uploaded images in place to a size budget.

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use upload_compress::replace::is_leftover_temp;
use upload_compress::{
    sniff, BatchItem, BatchItemOutcome, BatchSummary, Codec, CompressionConfig, CompressionResult,
    Compressor, ImageClass,
};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "upcompress")]
#[command(about = "Compress uploaded images in place to a size budget")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "UPCOMPRESS_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a single image
    Compress {
        /// Path to image file
        path: PathBuf,
        /// Image class (product, logo, avatar, ...)
        #[arg(long, default_value = "product")]
        class: String,
        /// Declared MIME type; sniffed from the file when omitted
        #[arg(long)]
        mime: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compress every image under a directory
    Batch {
        /// Directory to scan
        path: PathBuf,
        /// Image class applied to every file
        #[arg(long, default_value = "product")]
        class: String,
        /// Concurrent workers (overrides batch.workers)
        #[arg(long)]
        workers: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as TOML
    Config,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => CompressionConfig::load(path)?,
        None => CompressionConfig::default(),
    };

    match cli.command {
        Commands::Compress { path, class, mime, json } => {
            let mime = match mime {
                Some(mime) => mime,
                None => sniff_mime(&path)?,
            };
            let compressor = Compressor::new(config)?;
            let result = compressor.compress(&path, ImageClass::from_tag(&class), &mime)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&path.display().to_string(), &result);
            }
        }

        Commands::Batch { path, class, workers, json } => {
            if let Some(workers) = workers {
                config.batch.workers = workers;
            }
            let compressor = Compressor::new(config)?;
            let class = ImageClass::from_tag(&class);

            let items = discover(&path, class)?;
            if items.is_empty() {
                eprintln!("No JPEG, PNG or WebP images found under {}", path.display());
                return Ok(ExitCode::SUCCESS);
            }

            let pb = spinner(&format!("Compressing {} images", items.len()));
            let outcomes = compressor.compress_batch(items);
            let summary = BatchSummary::from_outcomes(&outcomes);
            pb.finish_and_clear();

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "items": outcomes,
                        "summary": summary,
                    }))?
                );
            } else {
                for outcome in &outcomes {
                    match outcome {
                        BatchItemOutcome::Success { identifier, result } => print_result(identifier, result),
                        BatchItemOutcome::Failure { identifier, error, code } => {
                            eprintln!("{} {} [{}] {}", "✗".red(), identifier, *code as u32, error);
                        }
                    }
                }
                if let Some(summary) = &summary {
                    println!();
                    println!("{}", summary.bold());
                }
            }

            if summary.is_some_and(|s| s.failed > 0) {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Config => {
            config.validate()?;
            print!("{}", config.to_toml_string()?);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("upload_compress=debug,upload_compress_cli=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("upload_compress=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// MIME type from the file's magic bytes, JPEG when unrecognized.
fn sniff_mime(path: &Path) -> anyhow::Result<String> {
    let mut header = [0u8; 12];
    let mut file = std::fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let read = file.read(&mut header)?;
    Ok(sniff(&header[..read]).unwrap_or(Codec::Jpeg).mime_type().to_string())
}

/// Collect supported images under `root`, keyed by their path relative to it.
///
/// Temp files left next to their source by an interrupted run are skipped.
fn discover(root: &Path, class: ImageClass) -> anyhow::Result<Vec<BatchItem>> {
    let entries: Vec<_> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .collect();

    let mut items = Vec::new();
    for entry in entries {
        let path = entry.path();
        if is_leftover_temp(path) {
            tracing::warn!(path = %path.display(), "skipping leftover temp file");
            continue;
        }
        let mut header = [0u8; 12];
        let Ok(read) = std::fs::File::open(path).and_then(|mut f| f.read(&mut header)) else {
            tracing::warn!(path = %path.display(), "skipping unreadable file");
            continue;
        };
        let Some(codec) = sniff(&header[..read]) else {
            continue;
        };

        let identifier = path.strip_prefix(root).unwrap_or(path).display().to_string();
        items.push(BatchItem::new(identifier, path, class, codec.mime_type()));
    }

    Ok(items)
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.blue} {msg} [{elapsed_precise}]")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn print_result(identifier: &str, result: &CompressionResult) {
    if result.was_compressed {
        let quality = result.final_quality.map(|q| format!(" q{}", q)).unwrap_or_default();
        let codec = result.codec.map(|c| format!(" {}", c)).unwrap_or_default();
        println!(
            "{} {} {:.1} KB -> {:.1} KB ({:.2}%, {} attempts{}{}, {} ms)",
            "✓".green(),
            identifier,
            result.original_size_kb,
            result.final_size_kb,
            result.compression_ratio_pct,
            result.attempts,
            codec,
            quality,
            result.processing_time_ms
        );
    } else {
        println!(
            "{} {} {:.1} KB unchanged",
            "·".dimmed(),
            identifier,
            result.original_size_kb
        );
    }
}
