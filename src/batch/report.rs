use crate::compressor::CompressionResult;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// The single outcome recorded for one selected file
#[derive(Debug)]
pub struct FileOutcome {
    /// Position in the selection
    pub index: usize,
    pub path: PathBuf,
    pub result: CompressionResult,
}

impl FileOutcome {
    /// One-line human readable result
    pub fn result_line(&self) -> String {
        let name = self.path.display();
        match &self.result {
            CompressionResult::Success { output_path } => {
                format!("[OK] {} -> {}", name, output_path.display())
            }
            CompressionResult::Skipped { reason } => format!("[SKIP] {}: {}", name, reason),
            CompressionResult::Failed { reason } => format!("[FAIL] {}: {}", name, reason),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total: usize,
}

impl BatchSummary {
    pub fn record(&mut self, result: &CompressionResult) {
        self.total += 1;
        match result {
            CompressionResult::Success { .. } => self.succeeded += 1,
            CompressionResult::Skipped { .. } => self.skipped += 1,
            CompressionResult::Failed { .. } => self.failed += 1,
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Processed: {} files | Compressed: {} | Skipped: {} | Failed: {}",
            self.total, self.succeeded, self.skipped, self.failed
        )
    }
}

/// Everything a run produced, in selection order
#[derive(Debug)]
pub struct BatchReport {
    pub outcomes: Vec<FileOutcome>,
    pub summary: BatchSummary,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn new(outcomes: Vec<FileOutcome>, elapsed: Duration) -> Self {
        let mut summary = BatchSummary::default();
        for outcome in &outcomes {
            summary.record(&outcome.result);
        }
        Self { outcomes, summary, elapsed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompressError;

    #[test]
    fn test_summary_counts_each_outcome_once() {
        let outcomes = vec![
            FileOutcome {
                index: 0,
                path: "/r/a.png".into(),
                result: CompressionResult::Success { output_path: "/r/a_compressed.jpg".into() },
            },
            FileOutcome {
                index: 1,
                path: "/r/b.png".into(),
                result: CompressionResult::Skipped { reason: CompressError::Cancelled },
            },
            FileOutcome {
                index: 2,
                path: "/r/c.png".into(),
                result: CompressionResult::Failed { reason: CompressError::DecodeFailure("bad".into()) },
            },
        ];

        let report = BatchReport::new(outcomes, Duration::from_millis(5));
        assert_eq!(report.summary, BatchSummary { succeeded: 1, skipped: 1, failed: 1, total: 3 });
        assert!(report.outcomes[0].result_line().starts_with("[OK] /r/a.png"));
        assert!(report.outcomes[2].result_line().starts_with("[FAIL]"));
    }
}
