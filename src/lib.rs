//! # Secure Media Compressor Library
//!
//! Compressione batch di immagini e video con una catena di sicurezza
//! davanti a ogni file.
//!
//! ## Architettura dei moduli:
//! - `config`: caricamento e validazione della configurazione JSON, `SecurityConfig`
//! - `error`: `CompressError`, con la distinzione skip / fail / fatale
//! - `security`: gatekeeper dei path, classifier (estensione, MIME, dimensione), scanner antimalware
//! - `compressor`: policy di compressione, resize condiviso, compressori immagini e video
//! - `batch`: worker pool, collector dei risultati, stop cooperativo, report
//! - `file_manager`: enumerazione della directory e selezione per tipo
//! - `progress` / `json_output`: feedback umano (indicatif) o JSON-lines
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use secure_media_compressor::{BatchOrchestrator, CompressionPolicy, ScanGate, SecurityConfig};
//!
//! let security = Arc::new(SecurityConfig::from_settings(&config.security)?);
//! let policy = CompressionPolicy::from_selection("webp", 1080, Some(75), None)?;
//! let orchestrator = BatchOrchestrator::new(security, policy, ScanGate::from_settings(&config.scanner)?, config.tools);
//! let report = orchestrator.run(files, &mut ProgressManager::new()).await;
//! ```

pub mod batch;
pub mod compressor;
pub mod config;
pub mod error;
pub mod file_manager;
pub mod json_output;
pub mod progress;
pub mod security;
pub mod utils;

pub use batch::{BatchOrchestrator, BatchReport, BatchSummary, FileOutcome, ProgressSink, StopSignal};
pub use compressor::{CompressionPolicy, CompressionResult, OutputFormat, QualitySetting};
pub use config::{AppConfig, SecurityConfig};
pub use error::CompressError;
pub use security::{PathGatekeeper, ScanGate};
