//! # File Classifier
//!
//! Determina il tipo reale di un file e lo valida contro le allow-list configurate.
//!
//! ## Ordine dei controlli (fail-fast, vince il primo errore):
//! 1. **Estensione**: lowercase, testo dopo l'ultimo punto
//! 2. **Content sniffing**: magic numbers via `infer`, mai fidarsi dell'estensione
//! 3. **Dimensione**: MB = bytes / 1024², 0 = illimitato
//!
//! Estensione e sniffing sono entrambi necessari: da soli sono aggirabili
//! (estensione falsificata vs. file poliglotti).

use crate::config::SecurityConfig;
use crate::error::CompressError;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Broad media family, derived from the sniffed MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaCategory {
    Image,
    Video,
}

impl MediaCategory {
    pub fn from_mime(mime: &str) -> Option<Self> {
        if mime.starts_with("image/") {
            Some(Self::Image)
        } else if mime.starts_with("video/") {
            Some(Self::Video)
        } else {
            None
        }
    }
}

impl fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// A file that passed classification
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFile {
    pub absolute_path: PathBuf,
    pub detected_mime_type: String,
    pub extension: String,
    pub size_bytes: u64,
    pub category: MediaCategory,
}

/// Validates extension, real content type and size
#[derive(Debug, Clone)]
pub struct FileClassifier {
    security: Arc<SecurityConfig>,
}

impl FileClassifier {
    pub fn new(security: Arc<SecurityConfig>) -> Self {
        Self { security }
    }

    /// Run all checks in order and build the candidate record
    pub fn classify(&self, path: &Path) -> Result<CandidateFile, CompressError> {
        let extension = self.validate_extension(path)?;
        let detected_mime_type = self.sniff_mime_type(path)?;

        let category = MediaCategory::from_mime(&detected_mime_type).ok_or_else(|| {
            warn!(path = %path.display(), mime = %detected_mime_type, "Allowed MIME type is not image or video media");
            CompressError::MimeTypeRejected { mime: detected_mime_type.clone() }
        })?;

        let size_bytes = self.validate_file_size(path)?;

        debug!(
            path = %path.display(),
            mime = %detected_mime_type,
            size_bytes,
            "File classified as {}",
            category
        );

        Ok(CandidateFile {
            absolute_path: path.to_path_buf(),
            detected_mime_type,
            extension,
            size_bytes,
            category,
        })
    }

    /// Check the lowercased extension against the allow-list and return it
    pub fn validate_extension(&self, path: &Path) -> Result<String, CompressError> {
        let extension = extension_of(path);
        if self.security.is_extension_allowed(&extension) {
            Ok(extension)
        } else {
            warn!(path = %path.display(), extension = %extension, "File extension is not allowed");
            Err(CompressError::ExtensionRejected { extension })
        }
    }

    /// Detect the MIME type from the file's leading bytes and check it
    /// against the allowed prefixes. Content that cannot be identified is rejected.
    pub fn sniff_mime_type(&self, path: &Path) -> Result<String, CompressError> {
        let mime = infer::get_from_path(path)?
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        if self.security.is_mime_allowed(&mime) {
            debug!(path = %path.display(), mime = %mime, "Valid MIME type");
            Ok(mime)
        } else {
            warn!(path = %path.display(), mime = %mime, "Invalid MIME type");
            Err(CompressError::MimeTypeRejected { mime })
        }
    }

    /// Check the size limit and return the size in bytes
    pub fn validate_file_size(&self, path: &Path) -> Result<u64, CompressError> {
        let size_bytes = std::fs::metadata(path)?.len();
        let limit_mb = self.security.max_file_size_mb();
        if limit_mb == 0.0 {
            return Ok(size_bytes);
        }

        let size_mb = size_bytes as f64 / BYTES_PER_MB;
        if size_mb > limit_mb {
            warn!(path = %path.display(), size_mb, limit_mb, "File exceeds the maximum size");
            return Err(CompressError::SizeExceeded { size_mb, limit_mb });
        }
        Ok(size_bytes)
    }
}

/// Lowercased text after the last dot of the file name, without the dot
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}
