//! # JSON Output Module
//!
//! Output strutturato JSON-lines su stdout, per consumatori programmatici.
//!
//! ## Tipi di messaggi:
//! - `start`: inizio batch, con policy e numero di file
//! - `file_complete`: esito di un singolo file (success / skipped / failed)
//! - `progress`: frazione completata in [0, 1]
//! - `complete`: riepilogo finale
//! - `error`: errore fatale prima o durante l'avvio del batch

use crate::batch::{progress_fraction, BatchReport, BatchSummary, FileOutcome, ProgressSink};
use crate::compressor::CompressionPolicy;
use serde::Serialize;
use std::path::PathBuf;

/// One JSON line
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    Start {
        input_dir: PathBuf,
        total_files: usize,
        workers: usize,
        policy: CompressionPolicy,
    },
    FileComplete {
        index: usize,
        path: PathBuf,
        status: &'static str,
        output_path: Option<PathBuf>,
        reason: Option<String>,
        reason_kind: Option<&'static str>,
    },
    Progress {
        completed: usize,
        total: usize,
        fraction: f64,
    },
    Complete {
        summary: BatchSummary,
        duration_seconds: f64,
    },
    Error {
        message: String,
        details: Option<String>,
    },
}

impl JsonMessage {
    /// Print as a single line on stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn file_complete(outcome: &FileOutcome) -> Self {
        Self::FileComplete {
            index: outcome.index,
            path: outcome.path.clone(),
            status: outcome.result.status(),
            output_path: outcome.result.output_path().map(PathBuf::from),
            reason: outcome.result.reason().map(|r| r.to_string()),
            reason_kind: outcome.result.reason().map(|r| r.kind()),
        }
    }

    pub fn progress(completed: usize, total: usize) -> Self {
        Self::Progress {
            completed,
            total,
            fraction: progress_fraction(completed, total),
        }
    }

    pub fn complete(report: &BatchReport) -> Self {
        Self::Complete {
            summary: report.summary,
            duration_seconds: report.elapsed.as_secs_f64(),
        }
    }

    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }
}

/// Progress sink that writes JSON lines instead of a progress bar
pub struct JsonProgress {
    input_dir: PathBuf,
    workers: usize,
    policy: CompressionPolicy,
}

impl JsonProgress {
    pub fn new(input_dir: PathBuf, workers: usize, policy: CompressionPolicy) -> Self {
        Self { input_dir, workers, policy }
    }
}

impl ProgressSink for JsonProgress {
    fn on_start(&mut self, total: usize) {
        JsonMessage::Start {
            input_dir: self.input_dir.clone(),
            total_files: total,
            workers: self.workers,
            policy: self.policy.clone(),
        }
        .emit();
    }

    fn on_file_complete(&mut self, outcome: &FileOutcome, completed: usize, total: usize) {
        JsonMessage::file_complete(outcome).emit();
        JsonMessage::progress(completed, total).emit();
    }

    fn on_finish(&mut self, report: &BatchReport) {
        JsonMessage::complete(report).emit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::CompressionResult;
    use crate::error::CompressError;
    use serde_json::Value;

    #[test]
    fn test_file_complete_shape() {
        let outcome = FileOutcome {
            index: 3,
            path: "/media/x.png".into(),
            result: CompressionResult::Skipped {
                reason: CompressError::ExtensionRejected { extension: "exe".into() },
            },
        };

        let value: Value = serde_json::to_value(JsonMessage::file_complete(&outcome)).unwrap();
        assert_eq!(value["type"], "file_complete");
        assert_eq!(value["index"], 3);
        assert_eq!(value["status"], "skipped");
        assert_eq!(value["reason_kind"], "extension_rejected");
        assert!(value["output_path"].is_null());
    }

    #[test]
    fn test_progress_fraction() {
        let value = serde_json::to_value(JsonMessage::progress(1, 4)).unwrap();
        assert_eq!(value["type"], "progress");
        assert_eq!(value["fraction"], 0.25);
    }

    #[test]
    fn test_start_includes_policy() {
        let policy = CompressionPolicy::from_selection("webp", 1080, Some(60), None).unwrap();
        let message = JsonMessage::Start {
            input_dir: "/media".into(),
            total_files: 2,
            workers: 4,
            policy,
        };
        let value = serde_json::to_value(message).unwrap();
        assert_eq!(value["policy"]["output_format"], "webp");
        assert_eq!(value["policy"]["setting"]["quality"], 60);
    }
}
