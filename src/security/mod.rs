//! # Security Gate Module
//!
//! Catena di validazione che deve passare prima che un compressore tocchi un file:
//! - `gatekeeper`: confinamento dei path nella root configurata
//! - `classifier`: estensione, content sniffing (magic numbers) e dimensione
//! - `scanner`: hook verso uno scanner antimalware esterno, con policy esplicita

pub mod classifier;
pub mod gatekeeper;
pub mod scanner;

pub use classifier::{CandidateFile, FileClassifier, MediaCategory};
pub use gatekeeper::PathGatekeeper;
pub use scanner::{ClamAvConnection, ClamAvScanner, NoOpScanner, ScanGate, ScanVerdict, ThreatScanner, UnavailablePolicy};
