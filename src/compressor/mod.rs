//! # Compression Pipeline Module
//!
//! Trasformazione resize-then-encode applicata in modo uniforme a immagini e video.
//!
//! ## Responsabilità:
//! - `CompressionPolicy`: formato di output, limite di risoluzione, qualità o bitrate
//! - Validazione della policy *prima* dell'avvio del batch (formati non supportati = fatale)
//! - Calcolo delle dimensioni di resize condiviso tra immagini e video
//! - Path di output deterministico: `<dir>/<stem>_compressed.<ext>`
//!
//! ## Sottomoduli:
//! - `image_compressor`: decode/resize/encode in-process con il crate `image` (+ libwebp)
//! - `video_compressor`: ffprobe per le dimensioni, ffmpeg per l'encode
//!
//! ## Policy di resize:
//! Se `max(width, height) > limit` entrambe le dimensioni vengono scalate di
//! `limit / max(width, height)` troncando a intero; altrimenti restano invariate.

pub mod image_compressor;
pub mod video_compressor;

pub use image_compressor::ImageCompressor;
pub use video_compressor::VideoCompressor;

use crate::error::CompressError;
use crate::security::{CandidateFile, MediaCategory};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Fixed set of producible formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    Webp,
    Mp4,
    Webm,
}

impl OutputFormat {
    /// Lowercase file extension written for this format
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
        }
    }

    pub fn category(self) -> MediaCategory {
        match self {
            Self::Jpeg | Self::Png | Self::Webp => MediaCategory::Image,
            Self::Mp4 | Self::Webm => MediaCategory::Video,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = CompressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::Webp),
            "mp4" => Ok(Self::Mp4),
            "webm" => Ok(Self::Webm),
            other => Err(CompressError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Quality for image formats, target bitrate for video formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualitySetting {
    Quality(u8),
    BitrateKbps(u32),
}

/// Per-run compression settings; immutable once built
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionPolicy {
    output_format: OutputFormat,
    resolution_limit: u32,
    setting: QualitySetting,
}

impl CompressionPolicy {
    pub fn new(
        output_format: OutputFormat,
        resolution_limit: u32,
        setting: QualitySetting,
    ) -> Result<Self, CompressError> {
        if resolution_limit == 0 {
            return Err(CompressError::InvalidPolicy(
                "resolution limit must be a positive number of pixels".to_string(),
            ));
        }

        match (output_format.category(), setting) {
            (MediaCategory::Image, QualitySetting::Quality(q)) if (1..=100).contains(&q) => {}
            (MediaCategory::Image, QualitySetting::Quality(q)) => {
                return Err(CompressError::InvalidPolicy(format!(
                    "quality must be between 1 and 100, got {q}"
                )))
            }
            (MediaCategory::Video, QualitySetting::BitrateKbps(kbps)) if kbps > 0 => {}
            (MediaCategory::Video, QualitySetting::BitrateKbps(_)) => {
                return Err(CompressError::InvalidPolicy(
                    "bitrate must be greater than 0 kbps".to_string(),
                ))
            }
            (MediaCategory::Image, QualitySetting::BitrateKbps(_)) => {
                return Err(CompressError::InvalidPolicy(format!(
                    "{output_format} is an image format and takes a quality, not a bitrate"
                )))
            }
            (MediaCategory::Video, QualitySetting::Quality(_)) => {
                return Err(CompressError::InvalidPolicy(format!(
                    "{output_format} is a video format and takes a bitrate, not a quality"
                )))
            }
        }

        Ok(Self { output_format, resolution_limit, setting })
    }

    /// Build from raw user selections. The format string is checked first so an
    /// unknown format is reported as such regardless of the other values.
    pub fn from_selection(
        format: &str,
        resolution_limit: u32,
        quality: Option<u8>,
        bitrate_kbps: Option<u32>,
    ) -> Result<Self, CompressError> {
        let output_format = OutputFormat::from_str(format)?;
        let setting = match output_format.category() {
            MediaCategory::Image => QualitySetting::Quality(quality.unwrap_or(75)),
            MediaCategory::Video => QualitySetting::BitrateKbps(bitrate_kbps.unwrap_or(1000)),
        };
        Self::new(output_format, resolution_limit, setting)
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    pub fn resolution_limit(&self) -> u32 {
        self.resolution_limit
    }

    pub fn setting(&self) -> QualitySetting {
        self.setting
    }

    /// Image quality in 1..=100, if this is an image policy
    pub fn quality(&self) -> Option<u8> {
        match self.setting {
            QualitySetting::Quality(q) => Some(q),
            QualitySetting::BitrateKbps(_) => None,
        }
    }

    /// Target video bitrate, if this is a video policy
    pub fn bitrate_kbps(&self) -> Option<u32> {
        match self.setting {
            QualitySetting::BitrateKbps(kbps) => Some(kbps),
            QualitySetting::Quality(_) => None,
        }
    }
}

/// Outcome for one input file
#[derive(Debug)]
pub enum CompressionResult {
    Success { output_path: PathBuf },
    Skipped { reason: CompressError },
    Failed { reason: CompressError },
}

impl CompressionResult {
    /// Classify an error as a policy skip or a processing failure
    pub fn from_error(reason: CompressError) -> Self {
        if reason.is_rejection() {
            Self::Skipped { reason }
        } else {
            Self::Failed { reason }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn output_path(&self) -> Option<&Path> {
        match self {
            Self::Success { output_path } => Some(output_path),
            _ => None,
        }
    }

    pub fn reason(&self) -> Option<&CompressError> {
        match self {
            Self::Success { .. } => None,
            Self::Skipped { reason } | Self::Failed { reason } => Some(reason),
        }
    }
}

impl From<Result<PathBuf, CompressError>> for CompressionResult {
    fn from(result: Result<PathBuf, CompressError>) -> Self {
        match result {
            Ok(output_path) => Self::Success { output_path },
            Err(reason) => Self::from_error(reason),
        }
    }
}

/// A resize-then-encode transform for one media category
#[async_trait]
pub trait MediaCompressor: Send + Sync {
    /// Media family this compressor accepts
    fn category(&self) -> MediaCategory;

    /// Compress one validated file and return the output path
    async fn try_compress(
        &self,
        candidate: &CandidateFile,
        policy: &CompressionPolicy,
    ) -> Result<PathBuf, CompressError>;

    async fn compress(&self, candidate: &CandidateFile, policy: &CompressionPolicy) -> CompressionResult {
        self.try_compress(candidate, policy).await.into()
    }
}

/// Dimensions after applying the resolution limit. When the larger side
/// exceeds `limit` it becomes exactly `limit` and the other side is scaled by
/// the same factor, truncated; otherwise the input is returned unchanged.
pub fn fit_within_limit(width: u32, height: u32, limit: u32) -> (u32, u32) {
    let max_dimension = width.max(height);
    if max_dimension <= limit || max_dimension == 0 {
        return (width, height);
    }

    // Integer math keeps the truncation exact where a float scale factor can land just below
    let scale = |side: u32| -> u32 {
        let scaled = u64::from(side) * u64::from(limit) / u64::from(max_dimension);
        (scaled as u32).max(1)
    };
    (scale(width), scale(height))
}

/// `<dir>/<stem>_compressed.<ext>` next to the input
pub fn compressed_output_path(input: &Path, format: OutputFormat) -> Result<PathBuf, CompressError> {
    let stem = input
        .file_stem()
        .ok_or_else(|| CompressError::EncodeFailure(format!("invalid file name: {}", input.display())))?
        .to_string_lossy();
    Ok(input.with_file_name(format!("{}_compressed.{}", stem, format.extension())))
}
