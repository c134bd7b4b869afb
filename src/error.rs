//! # Error Types Module
//!
//! Questo modulo definisce la tassonomia degli errori del gatekeeper e della pipeline di compressione.
//!
//! ## Responsabilità:
//! - Definisce `CompressError` enum per categorizzare tutti gli esiti negativi di un file
//! - Distingue "rifiutato dalla policy" da "fallito in encode" da "formato non supportato"
//! - Integra con `thiserror` (conversione automatica da `std::io::Error`)
//!
//! ## Categorie di errori:
//! - **Gate** (`PathDenied`, `ExtensionRejected`, `MimeTypeRejected`, `SizeExceeded`,
//!   `ThreatDetected`, `ScannerUnavailable`, `FormatMismatch`, `OutputConflict`, `Cancelled`):
//!   locali al singolo file, il file viene registrato come *Skipped*
//! - **Processing** (`DecodeFailure`, `EncodeFailure`, `Io`): locali al singolo file,
//!   il file viene registrato come *Failed*
//! - **Configurazione** (`UnsupportedFormat`, `InvalidPolicy`, `Config`): rilevati prima
//!   dell'avvio del batch, fatali per l'intera esecuzione
//!
//! ## Esempio:
//! ```rust,ignore
//! if !allowed {
//!     return Err(CompressError::PathDenied(path.to_path_buf()));
//! }
//! ```

use std::path::PathBuf;

/// Every way a single file, or a whole run, can fail
#[derive(thiserror::Error, Debug)]
pub enum CompressError {
    #[error("access denied for path outside the allowed root: {}", .0.display())]
    PathDenied(PathBuf),

    #[error("file extension '{extension}' is not allowed")]
    ExtensionRejected { extension: String },

    #[error("content type {mime} is not allowed")]
    MimeTypeRejected { mime: String },

    #[error("file size {size_mb:.2} MB exceeds the limit of {limit_mb} MB")]
    SizeExceeded { size_mb: f64, limit_mb: f64 },

    #[error("threat detected: {0}")]
    ThreatDetected(String),

    #[error("malware scanner unavailable: {0}")]
    ScannerUnavailable(String),

    #[error("cannot produce {format} output from {category} input")]
    FormatMismatch { category: String, format: String },

    #[error("output {} is already produced by an earlier file in the selection", .0.display())]
    OutputConflict(PathBuf),

    #[error("skipped: batch was stopped before this file was scheduled")]
    Cancelled,

    #[error("decode failed: {0}")]
    DecodeFailure(String),

    #[error("encode failed: {0}")]
    EncodeFailure(String),

    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid compression policy: {0}")]
    InvalidPolicy(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompressError {
    /// True for conditions where policy refused the file rather than the
    /// pipeline breaking on it.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::PathDenied(_)
                | Self::ExtensionRejected { .. }
                | Self::MimeTypeRejected { .. }
                | Self::SizeExceeded { .. }
                | Self::ThreatDetected(_)
                | Self::ScannerUnavailable(_)
                | Self::FormatMismatch { .. }
                | Self::OutputConflict(_)
                | Self::Cancelled
        )
    }

    /// True for configuration problems that must stop the run before any file is touched
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat(_) | Self::InvalidPolicy(_) | Self::Config(_)
        )
    }

    /// Short stable identifier, used in JSON output
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PathDenied(_) => "path_denied",
            Self::ExtensionRejected { .. } => "extension_rejected",
            Self::MimeTypeRejected { .. } => "mime_type_rejected",
            Self::SizeExceeded { .. } => "size_exceeded",
            Self::ThreatDetected(_) => "threat_detected",
            Self::ScannerUnavailable(_) => "scanner_unavailable",
            Self::FormatMismatch { .. } => "format_mismatch",
            Self::OutputConflict(_) => "output_conflict",
            Self::Cancelled => "cancelled",
            Self::DecodeFailure(_) => "decode_failure",
            Self::EncodeFailure(_) => "encode_failure",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::InvalidPolicy(_) => "invalid_policy",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_errors_are_rejections() {
        assert!(CompressError::PathDenied(PathBuf::from("/x")).is_rejection());
        assert!(CompressError::ThreatDetected("Eicar".into()).is_rejection());
        assert!(CompressError::Cancelled.is_rejection());
        assert!(CompressError::OutputConflict(PathBuf::from("/x_compressed.jpg")).is_rejection());
        assert!(!CompressError::EncodeFailure("boom".into()).is_rejection());
        assert!(!CompressError::DecodeFailure("boom".into()).is_rejection());
    }

    #[test]
    fn test_only_configuration_errors_are_fatal() {
        assert!(CompressError::UnsupportedFormat("gif".into()).is_fatal());
        assert!(CompressError::InvalidPolicy("quality 0".into()).is_fatal());
        assert!(!CompressError::SizeExceeded { size_mb: 2.0, limit_mb: 1.0 }.is_fatal());
    }

    #[test]
    fn test_size_message_is_human_readable() {
        let err = CompressError::SizeExceeded { size_mb: 12.5, limit_mb: 10.0 };
        assert_eq!(err.to_string(), "file size 12.50 MB exceeds the limit of 10 MB");
    }
}
