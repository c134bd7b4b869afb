//! # Progress Reporting Module
//!
//! Progress bar `indicatif` per l'uso interattivo.
//!
//! ## Responsabilità:
//! - Barra di avanzamento con tempo trascorso e percentuale
//! - Messaggio con l'esito dell'ultimo file completato
//! - Riga di riepilogo finale (compressi / saltati / falliti)
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:12] [========================>---------------] 9/15 (60%) [OK] holiday.png
//! ```

use crate::batch::{BatchReport, FileOutcome, ProgressSink};
use crate::compressor::CompressionResult;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress bar driven by the batch collector
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressManager {
    /// Bar without a length; the length is set when the batch starts
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);

        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        bar.set_style(style);

        Self { bar }
    }

    /// Hidden bar, for tests and non-interactive runs
    pub fn hidden() -> Self {
        Self { bar: ProgressBar::hidden() }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn length(&self) -> Option<u64> {
        self.bar.length()
    }
}

impl ProgressSink for ProgressManager {
    fn on_start(&mut self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.enable_steady_tick(Duration::from_millis(100));
    }

    fn on_file_complete(&mut self, outcome: &FileOutcome, completed: usize, _total: usize) {
        let name = outcome
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let message = match &outcome.result {
            CompressionResult::Success { .. } => format!("[OK] {name}"),
            CompressionResult::Skipped { reason } => format!("[SKIP] {name}: {}", reason.kind()),
            CompressionResult::Failed { reason } => format!("[FAIL] {name}: {}", reason.kind()),
        };
        self.bar.set_position(completed as u64);
        self.bar.set_message(message);
    }

    fn on_finish(&mut self, report: &BatchReport) {
        self.bar.finish_with_message(format_summary(report));
    }
}

/// Final one-line summary with elapsed time
pub fn format_summary(report: &BatchReport) -> String {
    format!("{} | Elapsed: {:.1}s", report.summary, report.elapsed.as_secs_f64())
}
