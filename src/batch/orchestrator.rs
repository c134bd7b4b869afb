//! # Batch Orchestrator
//!
//! Produttore + worker + collector:
//! - il produttore acquisisce un permesso dal `Semaphore` prima di ogni `tokio::spawn`
//!   (backpressure: al massimo `workers` file in volo)
//! - ogni worker esegue gatekeeper → classifier → scanner → compressore
//! - i risultati, etichettati con l'indice, arrivano via `mpsc` a un unico collector
//!   che aggiorna il progresso e ricostruisce l'ordine di selezione
//!
//! Prima di schedulare, i file il cui output coinciderebbe con quello di un file
//! precedente nella selezione (es. `a.png` e `a.jpg` → `a_compressed.webp`)
//! vengono saltati con `OutputConflict`.
//!
//! Lo stop viene controllato prima di schedulare ogni file; gli encode già
//! avviati vengono lasciati terminare.

use super::{BatchReport, FileOutcome, ProgressSink, StopSignal};
use crate::compressor::{compressed_output_path, CompressionPolicy, CompressionResult, ImageCompressor, MediaCompressor, VideoCompressor};
use crate::config::{default_workers, SecurityConfig, ToolSettings};
use crate::error::CompressError;
use crate::security::{FileClassifier, MediaCategory, PathGatekeeper, ScanGate};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Gate chain and compressors for one file; shared read-only by all workers
struct FilePipeline {
    gatekeeper: PathGatekeeper,
    classifier: FileClassifier,
    scan_gate: ScanGate,
    policy: CompressionPolicy,
    image: Arc<dyn MediaCompressor>,
    video: Arc<dyn MediaCompressor>,
}

impl FilePipeline {
    async fn process(&self, path: &Path) -> CompressionResult {
        self.try_process(path).await.into()
    }

    async fn try_process(&self, path: &Path) -> Result<PathBuf, CompressError> {
        let resolved = self.gatekeeper.resolve(path)?;
        let candidate = self.classifier.classify(&resolved)?;

        let format = self.policy.output_format();
        if candidate.category != format.category() {
            debug!(path = %path.display(), category = %candidate.category, format = %format, "Category cannot be produced by output format");
            return Err(CompressError::FormatMismatch {
                category: candidate.category.to_string(),
                format: format.to_string(),
            });
        }

        self.scan_gate.check(&candidate.absolute_path).await?;

        let compressor = match candidate.category {
            MediaCategory::Image => &self.image,
            MediaCategory::Video => &self.video,
        };
        compressor.try_compress(&candidate, &self.policy).await
    }
}

/// Runs the whole pipeline over a selection of files
pub struct BatchOrchestrator {
    pipeline: Arc<FilePipeline>,
    workers: usize,
    stop_signal: StopSignal,
}

impl BatchOrchestrator {
    pub fn new(
        security: Arc<SecurityConfig>,
        policy: CompressionPolicy,
        scan_gate: ScanGate,
        tools: ToolSettings,
    ) -> Self {
        let pipeline = FilePipeline {
            gatekeeper: PathGatekeeper::new(Arc::clone(&security)),
            classifier: FileClassifier::new(security),
            scan_gate,
            policy,
            image: Arc::new(ImageCompressor::new()),
            video: Arc::new(VideoCompressor::new(tools)),
        };

        Self {
            pipeline: Arc::new(pipeline),
            workers: default_workers(),
            stop_signal: StopSignal::new(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_stop_signal(mut self, stop_signal: StopSignal) -> Self {
        self.stop_signal = stop_signal;
        self
    }

    /// Handle that stops scheduling new files when triggered
    pub fn stop_signal(&self) -> StopSignal {
        self.stop_signal.clone()
    }

    /// Process every file and return one outcome per file, in selection order.
    /// Never aborts early: per-file errors become Skipped or Failed outcomes.
    pub async fn run(&self, files: Vec<PathBuf>, sink: &mut dyn ProgressSink) -> BatchReport {
        let start_time = Instant::now();
        let total = files.len();
        info!(
            total,
            workers = self.workers,
            format = %self.pipeline.policy.output_format(),
            resolution_limit = self.pipeline.policy.resolution_limit(),
            "Starting batch"
        );
        sink.on_start(total);

        let conflicts = conflicting_outputs(&files, &self.pipeline.policy);
        let (sender, receiver) = mpsc::unbounded_channel();
        let (_, outcomes) = tokio::join!(
            self.schedule(&files, conflicts, sender),
            Self::collect(receiver, &files, sink)
        );

        let report = BatchReport::new(outcomes, start_time.elapsed());
        info!(
            succeeded = report.summary.succeeded,
            skipped = report.summary.skipped,
            failed = report.summary.failed,
            "Batch finished in {:.1}s",
            report.elapsed.as_secs_f64()
        );
        sink.on_finish(&report);
        report
    }

    /// Producer: one spawned worker per file, bounded by the semaphore
    async fn schedule(
        &self,
        files: &[PathBuf],
        mut conflicts: Vec<Option<PathBuf>>,
        sender: UnboundedSender<FileOutcome>,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.workers));

        for (index, path) in files.iter().enumerate() {
            if let Some(target) = conflicts[index].take() {
                let _ = sender.send(FileOutcome {
                    index,
                    path: path.clone(),
                    result: CompressionResult::from_error(CompressError::OutputConflict(target)),
                });
                continue;
            }

            let permit = if self.stop_signal.is_stopped() {
                None
            } else {
                tokio::select! {
                    permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
                    _ = self.stop_signal.stopped() => None,
                }
            };

            // A stop may have arrived while waiting for the permit
            let permit = match permit {
                Some(permit) if !self.stop_signal.is_stopped() => permit,
                _ => {
                    debug!(path = %path.display(), "Batch stopped, file not scheduled");
                    let _ = sender.send(FileOutcome {
                        index,
                        path: path.clone(),
                        result: CompressionResult::from_error(CompressError::Cancelled),
                    });
                    continue;
                }
            };

            let pipeline = Arc::clone(&self.pipeline);
            let sender = sender.clone();
            let path = path.clone();
            tokio::spawn(async move {
                let result = pipeline.process(&path).await;
                let _ = sender.send(FileOutcome { index, path, result });
                drop(permit);
            });
        }
    }

    /// Single writer of progress; rebuilds selection order
    async fn collect(
        mut receiver: UnboundedReceiver<FileOutcome>,
        files: &[PathBuf],
        sink: &mut dyn ProgressSink,
    ) -> Vec<FileOutcome> {
        let total = files.len();
        let mut slots: Vec<Option<FileOutcome>> = (0..total).map(|_| None).collect();
        let mut completed = 0;

        while let Some(outcome) = receiver.recv().await {
            completed += 1;
            log_outcome(&outcome);
            sink.on_file_complete(&outcome, completed, total);
            let index = outcome.index;
            slots[index] = Some(outcome);
        }

        // A worker that panicked never reported; it still gets exactly one outcome
        let mut outcomes = Vec::with_capacity(total);
        for (index, slot) in slots.into_iter().enumerate() {
            let outcome = match slot {
                Some(outcome) => outcome,
                None => {
                    let outcome = FileOutcome {
                        index,
                        path: files[index].clone(),
                        result: CompressionResult::Failed {
                            reason: CompressError::EncodeFailure("worker ended without a result".to_string()),
                        },
                    };
                    completed += 1;
                    log_outcome(&outcome);
                    sink.on_file_complete(&outcome, completed, total);
                    outcome
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}

/// For each file, the output path it would share with an earlier file in the
/// selection. Paths are resolved the same way the pipeline resolves them;
/// files whose output cannot be derived are left to fail in the pipeline.
fn conflicting_outputs(files: &[PathBuf], policy: &CompressionPolicy) -> Vec<Option<PathBuf>> {
    let mut claimed = HashSet::new();
    files
        .iter()
        .map(|path| {
            let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.clone());
            let target = compressed_output_path(&resolved, policy.output_format()).ok()?;
            if claimed.insert(target.clone()) {
                None
            } else {
                debug!(path = %path.display(), output = %target.display(), "Output already claimed");
                Some(target)
            }
        })
        .collect()
}

fn log_outcome(outcome: &FileOutcome) {
    match &outcome.result {
        CompressionResult::Success { output_path } => {
            info!(path = %outcome.path.display(), output = %output_path.display(), "File compressed");
        }
        CompressionResult::Skipped { reason } => {
            info!(path = %outcome.path.display(), reason = reason.kind(), "File skipped: {}", reason);
        }
        CompressionResult::Failed { reason } => {
            warn!(path = %outcome.path.display(), reason = reason.kind(), "File failed: {}", reason);
        }
    }
}
