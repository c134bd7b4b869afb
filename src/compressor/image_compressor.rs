//! # Image Compressor
//!
//! Decode, resize e re-encode in-process con il crate `image`; WebP lossy via libwebp.
//!
//! ## Mappatura qualità (1-100) per formato:
//! | Formato | Parametro encoder | Note |
//! |---------|-------------------|------|
//! | JPEG    | quality del JPEG encoder, 1:1 | alpha scartato (RGB8) |
//! | PNG     | ignorato | lossless, `CompressionType::Best` + filtro adattivo |
//! | WebP    | quality factor libwebp (float), 1:1 | lossy, alpha preservato |
//!
//! ## Scrittura atomica:
//! L'output viene scritto in un file temporaneo nella stessa directory e poi
//! rinominato. Un errore lascia l'originale intatto e nessun output parziale.

use super::{compressed_output_path, fit_within_limit, CompressionPolicy, MediaCompressor, OutputFormat};
use crate::error::CompressError;
use crate::security::{CandidateFile, MediaCategory};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, GenericImageView, ImageEncoder};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Resize-then-encode for still images
#[derive(Debug, Clone, Default)]
pub struct ImageCompressor;

impl ImageCompressor {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous pipeline; CPU bound, so callers run it off the async workers
    pub fn compress_blocking(input: &Path, policy: &CompressionPolicy) -> Result<PathBuf, CompressError> {
        let format = policy.output_format();
        if format.category() != MediaCategory::Image {
            return Err(CompressError::UnsupportedFormat(format!("{format} is not an image format")));
        }
        let quality = policy
            .quality()
            .ok_or_else(|| CompressError::InvalidPolicy("image policy without quality".to_string()))?;

        info!(path = %input.display(), "Processing image file");
        let output_path = compressed_output_path(input, format)?;

        let image = image::io::Reader::open(input)?
            .with_guessed_format()?
            .decode()
            .map_err(|e| CompressError::DecodeFailure(e.to_string()))?;

        let image = Self::apply_resolution_limit(image, policy.resolution_limit());
        let encoded = Self::encode(&image, format, quality)?;
        write_atomically(&output_path, &encoded)?;

        info!(path = %input.display(), output = %output_path.display(), "Compressed image saved");
        Ok(output_path)
    }

    /// Downscale with Lanczos3 when the larger side exceeds `limit`
    pub fn apply_resolution_limit(image: DynamicImage, limit: u32) -> DynamicImage {
        let (width, height) = image.dimensions();
        let (new_width, new_height) = fit_within_limit(width, height, limit);
        if (new_width, new_height) == (width, height) {
            debug!(width, height, limit, "No resizing needed for image");
            return image;
        }

        debug!(
            from = %format!("{width}x{height}"),
            to = %format!("{new_width}x{new_height}"),
            scale = f64::from(limit) / f64::from(width.max(height)),
            "Resizing image"
        );
        image.resize_exact(new_width, new_height, FilterType::Lanczos3)
    }

    /// Encode into memory in the requested format
    pub fn encode(image: &DynamicImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>, CompressError> {
        let (width, height) = image.dimensions();
        let mut buffer = Vec::new();

        match format {
            OutputFormat::Jpeg => {
                let rgb = image.to_rgb8();
                JpegEncoder::new_with_quality(&mut buffer, quality)
                    .encode(rgb.as_raw(), width, height, ColorType::Rgb8)
                    .map_err(|e| CompressError::EncodeFailure(e.to_string()))?;
            }
            OutputFormat::Png => {
                let encoder = PngEncoder::new_with_quality(&mut buffer, CompressionType::Best, PngFilterType::Adaptive);
                let result = if image.color().has_alpha() {
                    encoder.write_image(image.to_rgba8().as_raw(), width, height, ColorType::Rgba8)
                } else {
                    encoder.write_image(image.to_rgb8().as_raw(), width, height, ColorType::Rgb8)
                };
                result.map_err(|e| CompressError::EncodeFailure(e.to_string()))?;
            }
            OutputFormat::Webp => {
                let quality = f32::from(quality);
                let memory = if image.color().has_alpha() {
                    let rgba = image.to_rgba8();
                    webp::Encoder::from_rgba(rgba.as_raw(), width, height).encode_simple(false, quality)
                } else {
                    let rgb = image.to_rgb8();
                    webp::Encoder::from_rgb(rgb.as_raw(), width, height).encode_simple(false, quality)
                }
                .map_err(|e| CompressError::EncodeFailure(format!("WebP encoding failed: {e:?}")))?;
                buffer.extend_from_slice(&memory);
            }
            OutputFormat::Mp4 | OutputFormat::Webm => {
                return Err(CompressError::UnsupportedFormat(format!("{format} is not an image format")));
            }
        }

        Ok(buffer)
    }
}

#[async_trait]
impl MediaCompressor for ImageCompressor {
    fn category(&self) -> MediaCategory {
        MediaCategory::Image
    }

    async fn try_compress(
        &self,
        candidate: &CandidateFile,
        policy: &CompressionPolicy,
    ) -> Result<PathBuf, CompressError> {
        let input = candidate.absolute_path.clone();
        let policy = policy.clone();
        tokio::task::spawn_blocking(move || Self::compress_blocking(&input, &policy))
            .await
            .map_err(|e| CompressError::EncodeFailure(format!("image worker aborted: {e}")))?
    }
}

/// Write to a temp file beside `target`, then rename over it
pub(crate) fn write_atomically(target: &Path, bytes: &[u8]) -> Result<(), CompressError> {
    let directory = target.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(directory)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(target).map_err(|e| CompressError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::{CompressionResult, QualitySetting};
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use std::fs;
    use tempfile::TempDir;

    fn candidate(path: &Path) -> CandidateFile {
        CandidateFile {
            absolute_path: path.to_path_buf(),
            detected_mime_type: "image/png".to_string(),
            extension: "png".to_string(),
            size_bytes: fs::metadata(path).map(|m| m.len()).unwrap_or(0),
            category: MediaCategory::Image,
        }
    }

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
        img.save(&path).unwrap();
        path
    }

    fn policy(format: OutputFormat, limit: u32) -> CompressionPolicy {
        CompressionPolicy::new(format, limit, QualitySetting::Quality(80)).unwrap()
    }

    #[tokio::test]
    async fn test_downscales_to_limit_and_writes_jpeg() {
        let temp_dir = TempDir::new().unwrap();
        let input = write_png(temp_dir.path(), "wide.png", 400, 200);
        let original = fs::read(&input).unwrap();

        let result = ImageCompressor::new()
            .compress(&candidate(&input), &policy(OutputFormat::Jpeg, 100))
            .await;

        let output = result.output_path().expect("compression should succeed").to_path_buf();
        assert_eq!(output, temp_dir.path().join("wide_compressed.jpg"));
        assert_eq!(image::image_dimensions(&output).unwrap(), (100, 50));
        assert_eq!(fs::read(&input).unwrap(), original);
    }

    #[tokio::test]
    async fn test_dimensions_unchanged_under_limit() {
        let temp_dir = TempDir::new().unwrap();
        let input = write_png(temp_dir.path(), "small.png", 64, 48);

        let result = ImageCompressor::new()
            .compress(&candidate(&input), &policy(OutputFormat::Png, 1000))
            .await;

        let output = result.output_path().unwrap();
        assert_eq!(image::image_dimensions(output).unwrap(), (64, 48));
    }

    #[tokio::test]
    async fn test_webp_output_keeps_alpha_and_aspect() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("logo.png");
        RgbaImage::from_pixel(90, 300, Rgba([10, 20, 30, 128])).save(&input).unwrap();

        let result = ImageCompressor::new()
            .compress(&candidate(&input), &policy(OutputFormat::Webp, 150))
            .await;

        let output = result.output_path().unwrap();
        assert_eq!(output, temp_dir.path().join("logo_compressed.webp"));
        assert_eq!(image::image_dimensions(output).unwrap(), (45, 150));
    }

    #[tokio::test]
    async fn test_corrupt_image_fails_without_leftovers() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("broken.png");
        let mut bytes = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.extend_from_slice(b"definitely not chunks");
        fs::write(&input, &bytes).unwrap();

        let result = ImageCompressor::new()
            .compress(&candidate(&input), &policy(OutputFormat::Jpeg, 100))
            .await;

        assert!(matches!(result, CompressionResult::Failed { reason: CompressError::DecodeFailure(_) }));
        let entries: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(fs::read(&input).unwrap(), bytes);
    }

    #[tokio::test]
    async fn test_video_policy_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let input = write_png(temp_dir.path(), "a.png", 10, 10);
        let video_policy = CompressionPolicy::new(OutputFormat::Mp4, 100, QualitySetting::BitrateKbps(500)).unwrap();

        let result = ImageCompressor::new().compress(&candidate(&input), &video_policy).await;
        assert!(matches!(result, CompressionResult::Failed { reason: CompressError::UnsupportedFormat(_) }));
    }

    #[test]
    fn test_apply_resolution_limit_matches_fit() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(4000, 2000));
        let resized = ImageCompressor::apply_resolution_limit(img, 1000);
        assert_eq!(resized.dimensions(), (1000, 500));
    }
}
