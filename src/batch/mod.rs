//! # Batch Module
//!
//! Orchestrazione del batch: per ogni file selezionato esegue la catena di gate
//! e poi il compressore della categoria rilevata.
//!
//! ## Responsabilità:
//! - Worker pool limitato da un `Semaphore` (default = core disponibili)
//! - Un solo collector riceve i risultati e aggiorna il progresso
//! - Report finale in ordine di selezione, con riepilogo succeeded/skipped/failed
//! - Stop cooperativo: i file non ancora schedulati diventano *Skipped*
//!
//! Il batch non si interrompe mai per l'errore di un singolo file.

pub mod orchestrator;
pub mod report;
pub mod stop_signal;

pub use orchestrator::BatchOrchestrator;
pub use report::{BatchReport, BatchSummary, FileOutcome};
pub use stop_signal::StopSignal;

/// Receives progress from the batch collector. Called from a single task only.
pub trait ProgressSink: Send {
    fn on_start(&mut self, _total: usize) {}

    /// Called once per file, with `completed` strictly increasing up to `total`
    fn on_file_complete(&mut self, outcome: &FileOutcome, completed: usize, total: usize);

    fn on_finish(&mut self, _report: &BatchReport) {}
}

/// Fraction of work done, in [0, 1]
pub fn progress_fraction(completed: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        completed.min(total) as f64 / total as f64
    }
}

/// Sink that ignores everything
#[derive(Debug, Default)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn on_file_complete(&mut self, _outcome: &FileOutcome, _completed: usize, _total: usize) {}
}
