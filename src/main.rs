//! # Secure Media Compressor - Main Entry Point
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI e carica la configurazione JSON
//! 2. Configura il logging (`logging.level`, `--verbose` forza DEBUG, `RUST_LOG` ha la precedenza)
//! 3. Costruisce la policy di compressione: formati o parametri non validi sono fatali
//! 4. Verifica che la directory sia dentro la root consentita, enumera e seleziona i file
//! 5. Avvia il batch; Ctrl-C ferma la schedulazione lasciando finire i file in corso
//! 6. Stampa una riga per file e il riepilogo (o JSON-lines con `--json`)
//!
//! ## Esempio di utilizzo:
//! ```bash
//! media-compressor ~/media/holiday --format webp --resolution-limit 1600 --quality 70 --types jpg,png
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use secure_media_compressor::batch::BatchOrchestrator;
use secure_media_compressor::compressor::{CompressionPolicy, VideoCompressor};
use secure_media_compressor::config::{AppConfig, SecurityConfig};
use secure_media_compressor::file_manager::FileManager;
use secure_media_compressor::json_output::{JsonMessage, JsonProgress};
use secure_media_compressor::progress::{format_summary, ProgressManager};
use secure_media_compressor::security::{MediaCategory, PathGatekeeper, ScanGate};
use secure_media_compressor::BatchReport;

#[derive(Parser)]
#[command(name = "media-compressor")]
#[command(about = "Resize and re-encode images and videos behind path, type, size and malware checks")]
struct Args {
    /// Directory containing the media to compress (must be inside security.base_directory)
    directory: PathBuf,

    /// JSON configuration file
    #[arg(short, long, default_value = "media-compressor.json")]
    config: PathBuf,

    /// Output format: jpg, png, webp, mp4 or webm
    #[arg(short, long)]
    format: String,

    /// Maximum width or height in pixels
    #[arg(short, long, default_value = "1080")]
    resolution_limit: u32,

    /// Image quality (1-100, image formats only; default 75)
    #[arg(short, long)]
    quality: Option<u8>,

    /// Video bitrate in kbps (video formats only; default 1000)
    #[arg(short, long)]
    bitrate: Option<u32>,

    /// Comma separated file types to include (default: all known media types)
    #[arg(short, long, value_delimiter = ',')]
    types: Vec<String>,

    /// Comma separated subdirectories to include, relative to the directory
    /// (default: all; use "." for the directory itself)
    #[arg(long, value_delimiter = ',')]
    dirs: Vec<String>,

    /// Only process the top-level directory
    #[arg(long)]
    no_recursive: bool,

    /// Number of parallel workers (default: processing.workers, then CPU cores)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON lines on stdout instead of a progress bar
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match AppConfig::from_file(&args.config).await {
        Ok(config) => config,
        Err(e) => return fail(&args, e),
    };

    init_logging(&config.logging.level, args.verbose)?;

    match run(&args, config).await {
        Ok(report) => {
            if report.summary.failed > 0 {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(e) => fail(&args, e),
    }
}

fn fail(args: &Args, error: anyhow::Error) -> Result<()> {
    if args.json {
        JsonMessage::error(error.to_string(), Some(format!("{error:#}"))).emit();
    }
    Err(error)
}

/// Logs go to stderr so stdout only carries results
fn init_logging(level: &str, verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .with_context(|| format!("Invalid logging level: {default_level}"))?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn run(args: &Args, config: AppConfig) -> Result<BatchReport> {
    // Fatal problems surface here, before any file is touched
    let policy = CompressionPolicy::from_selection(&args.format, args.resolution_limit, args.quality, args.bitrate)
        .context("Invalid compression settings")?;
    let video_output = policy.output_format().category() == MediaCategory::Video;
    if video_output && args.quality.is_some() {
        warn!("--quality is ignored for video formats, use --bitrate");
    } else if !video_output && args.bitrate.is_some() {
        warn!("--bitrate is ignored for image formats, use --quality");
    }

    let security = Arc::new(SecurityConfig::from_settings(&config.security)?);
    let directory = PathGatekeeper::new(Arc::clone(&security))
        .resolve(&args.directory)
        .with_context(|| {
            format!(
                "Directory {} is not inside the allowed root {}",
                args.directory.display(),
                security.root_directory().display()
            )
        })?;
    if !directory.is_dir() {
        return Err(anyhow::anyhow!("Not a directory: {}", directory.display()));
    }

    let structure = FileManager::scan_directory(&directory, !args.no_recursive);
    let types = if args.types.is_empty() {
        FileManager::default_file_types()
    } else {
        args.types.clone()
    };
    let dirs: Vec<PathBuf> = args.dirs.iter().map(|d| directory.join(d.trim())).collect();
    let files = FileManager::select_files(&structure, &types, &dirs);
    if files.is_empty() {
        warn!(directory = %directory.display(), "No files selected for processing");
    }

    let scan_gate = ScanGate::from_settings(&config.scanner)?;
    let workers = args
        .workers
        .unwrap_or_else(|| config.processing.effective_workers());
    if workers == 0 {
        return Err(anyhow::anyhow!("Number of workers must be greater than 0"));
    }

    if video_output && !VideoCompressor::new(config.tools.clone()).is_ffmpeg_available().await {
        warn!(ffmpeg = %config.tools.ffmpeg.display(), "ffmpeg is not available; video files will fail");
    }

    info!(
        directory = %directory.display(),
        files = files.len(),
        scanner = scan_gate.scanner_name(),
        "Compressing to {}",
        policy.output_format()
    );

    let orchestrator = BatchOrchestrator::new(security, policy.clone(), scan_gate, config.tools.clone())
        .with_workers(workers);

    let stop_signal = orchestrator.stop_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Stop requested, waiting for files in progress to finish");
            stop_signal.stop();
        }
    });

    let report = if args.json {
        let mut sink = JsonProgress::new(directory, workers, policy);
        orchestrator.run(files, &mut sink).await
    } else {
        let mut sink = ProgressManager::new();
        let report = orchestrator.run(files, &mut sink).await;
        for outcome in &report.outcomes {
            println!("{}", outcome.result_line());
        }
        println!("{}", format_summary(&report));
        report
    };

    Ok(report)
}
