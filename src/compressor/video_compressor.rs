//! # Video Compressor
//!
//! Resize e ricodifica dei video tramite FFmpeg come processo esterno.
//!
//! ## Pipeline:
//! 1. `ffprobe` legge larghezza/altezza del primo stream video (output JSON)
//! 2. Se il lato maggiore supera il limite: dimensioni ridotte e arrotondate per difetto
//!    a valori pari; altrimenti nessun filtro di scala
//! 3. `ffmpeg` scala e ricodifica verso un file temporaneo nella directory di destinazione
//! 4. Rename atomico su `<stem>_compressed.<ext>`
//!
//! ## Codec per formato:
//! - **mp4**: libx264 (preset medium) + AAC, `+faststart`
//! - **webm**: libvpx-vp9 + Vorbis
//!
//! Il bitrate della policy viene passato come `-b:v <kbps>k`.
//! Ogni encode ha un timeout; allo scadere il processo viene terminato.

use super::{compressed_output_path, fit_within_limit, CompressionPolicy, MediaCompressor, OutputFormat};
use crate::args;
use crate::config::ToolSettings;
use crate::error::CompressError;
use crate::security::{CandidateFile, MediaCategory};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Lines of ffmpeg stderr kept in an encode failure
const STDERR_TAIL_LINES: usize = 5;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
}

/// Video and audio encoder names for a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecPair {
    pub video: &'static str,
    pub audio: &'static str,
}

impl CodecPair {
    pub fn for_format(format: OutputFormat) -> Result<Self, CompressError> {
        match format {
            OutputFormat::Mp4 => Ok(Self { video: "libx264", audio: "aac" }),
            OutputFormat::Webm => Ok(Self { video: "libvpx-vp9", audio: "libvorbis" }),
            other => Err(CompressError::UnsupportedFormat(format!("{other} is not a video format"))),
        }
    }
}

/// ffprobe/ffmpeg driven video transform
#[derive(Debug, Clone)]
pub struct VideoCompressor {
    tools: ToolSettings,
}

impl VideoCompressor {
    pub fn new(tools: ToolSettings) -> Self {
        Self { tools }
    }

    /// True when `ffmpeg -version` runs successfully
    pub async fn is_ffmpeg_available(&self) -> bool {
        match Command::new(&self.tools.ffmpeg)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            Ok(status) => status.success(),
            Err(_) => false,
        }
    }

    /// Width and height of the first video stream
    pub async fn probe_dimensions(&self, input: &Path) -> Result<(u32, u32), CompressError> {
        let output = Command::new(&self.tools.ffprobe)
            .args(args![
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height",
                "-of",
                "json"
            ])
            .arg(input)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                CompressError::DecodeFailure(format!(
                    "failed to execute {}: {}",
                    self.tools.ffprobe.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(CompressError::DecodeFailure(format!(
                "ffprobe could not read the video: {}",
                stderr_tail(&output.stderr)
            )));
        }

        parse_probe_output(&output.stdout)
    }

    /// Full ffmpeg argument list, input and output included
    pub fn build_ffmpeg_args(
        input: &Path,
        output: &Path,
        scale_to: Option<(u32, u32)>,
        format: OutputFormat,
        bitrate_kbps: u32,
    ) -> Result<Vec<String>, CompressError> {
        let codecs = CodecPair::for_format(format)?;
        let bitrate = format!("{bitrate_kbps}k");
        let input = input.to_string_lossy();

        let mut args = args![
            "-hide_banner",
            "-nostdin",
            "-loglevel",
            "error",
            "-y",
            "-i",
            &*input
        ];
        if let Some((width, height)) = scale_to {
            let scale = format!("scale={width}:{height}");
            args.extend(args!["-vf", scale.as_str()]);
        }
        args.extend(args!["-c:v", codecs.video, "-b:v", bitrate.as_str()]);
        match format {
            OutputFormat::Mp4 => args.extend(args!["-preset", "medium", "-movflags", "+faststart"]),
            OutputFormat::Webm => args.extend(args!["-row-mt", "1"]),
            _ => {}
        }
        args.extend(args!["-c:a", codecs.audio, "-f", muxer_name(format)]);
        args.push(output.to_string_lossy().into_owned());
        Ok(args)
    }

    async fn run_ffmpeg(&self, args: &[String]) -> Result<(), CompressError> {
        debug!(command = %self.tools.ffmpeg.display(), args = ?args, "Running ffmpeg");

        let child = Command::new(&self.tools.ffmpeg)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CompressError::EncodeFailure(format!(
                    "failed to execute {}: {}",
                    self.tools.ffmpeg.display(),
                    e
                ))
            })?;

        let timeout = self.tools.encode_timeout();
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            // Dropping the future drops the child, which kills it
            Err(_) => {
                return Err(CompressError::EncodeFailure(format!(
                    "ffmpeg timed out after {}s",
                    timeout.as_secs()
                )))
            }
        };

        if output.status.success() {
            Ok(())
        } else {
            Err(CompressError::EncodeFailure(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr_tail(&output.stderr)
            )))
        }
    }
}

#[async_trait]
impl MediaCompressor for VideoCompressor {
    fn category(&self) -> MediaCategory {
        MediaCategory::Video
    }

    async fn try_compress(
        &self,
        candidate: &CandidateFile,
        policy: &CompressionPolicy,
    ) -> Result<PathBuf, CompressError> {
        let format = policy.output_format();
        CodecPair::for_format(format)?;
        let bitrate_kbps = policy
            .bitrate_kbps()
            .ok_or_else(|| CompressError::InvalidPolicy("video policy without bitrate".to_string()))?;

        let input = candidate.absolute_path.as_path();
        info!(path = %input.display(), "Processing video file");
        let output_path = compressed_output_path(input, format)?;

        let (width, height) = self.probe_dimensions(input).await?;
        let scale_to = scaled_dimensions(width, height, policy.resolution_limit());
        match scale_to {
            Some((w, h)) => debug!(
                from = %format!("{width}x{height}"),
                to = %format!("{w}x{h}"),
                bitrate_kbps,
                "Downscaling video"
            ),
            None => debug!(size = %format!("{width}x{height}"), bitrate_kbps, "Video within limit, keeping size"),
        }

        let directory = output_path.parent().unwrap_or_else(|| Path::new("."));
        let temp_path = tempfile::Builder::new()
            .prefix(".compressing-")
            .suffix(&format!(".{}", format.extension()))
            .tempfile_in(directory)?
            .into_temp_path();

        let args = Self::build_ffmpeg_args(input, &temp_path, scale_to, format, bitrate_kbps)?;
        let start_time = Instant::now();
        if let Err(e) = self.run_ffmpeg(&args).await {
            warn!(path = %input.display(), error = %e, "Video encode failed");
            return Err(e);
        }

        temp_path.persist(&output_path).map_err(|e| CompressError::Io(e.error))?;
        info!(
            path = %input.display(),
            output = %output_path.display(),
            "Compressed video saved in {:.1}s",
            start_time.elapsed().as_secs_f64()
        );
        Ok(output_path)
    }
}

/// Target size when the video exceeds `limit`, `None` when it already fits
pub fn scaled_dimensions(width: u32, height: u32, limit: u32) -> Option<(u32, u32)> {
    if width.max(height) <= limit {
        return None;
    }
    let (fit_width, fit_height) = fit_within_limit(width, height, limit);
    Some(even_dimensions(fit_width, fit_height))
}

/// Round down to even values, as required by 4:2:0 encoders; never below 2
pub fn even_dimensions(width: u32, height: u32) -> (u32, u32) {
    ((width & !1).max(2), (height & !1).max(2))
}

fn muxer_name(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Webm => "webm",
        _ => "mp4",
    }
}

fn parse_probe_output(stdout: &[u8]) -> Result<(u32, u32), CompressError> {
    let probe: ProbeOutput = serde_json::from_slice(stdout)
        .map_err(|e| CompressError::DecodeFailure(format!("unreadable ffprobe output: {e}")))?;

    probe
        .streams
        .iter()
        .find_map(|stream| match (stream.width, stream.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        })
        .ok_or_else(|| CompressError::DecodeFailure("no video stream found".to_string()))
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::{CompressionResult, QualitySetting};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_even_dimensions() {
        assert_eq!(even_dimensions(1280, 720), (1280, 720));
        assert_eq!(even_dimensions(1000, 666), (1000, 666));
        assert_eq!(even_dimensions(1081, 607), (1080, 606));
        assert_eq!(even_dimensions(1, 1), (2, 2));
    }

    #[test]
    fn test_video_within_limit_keeps_its_size() {
        assert_eq!(scaled_dimensions(641, 361, 1080), None);
        assert_eq!(scaled_dimensions(1080, 607, 1080), None);
    }

    #[test]
    fn test_oversized_video_is_scaled_to_even_dimensions() {
        assert_eq!(scaled_dimensions(1920, 1080, 1280), Some((1280, 720)));
        assert_eq!(scaled_dimensions(4000, 2001, 1000), Some((1000, 500)));
        assert_eq!(scaled_dimensions(1921, 1081, 1081), Some((1080, 608)));
    }

    #[test]
    fn test_codec_selection() {
        assert_eq!(CodecPair::for_format(OutputFormat::Mp4).unwrap().video, "libx264");
        assert_eq!(CodecPair::for_format(OutputFormat::Webm).unwrap().audio, "libvorbis");
        assert!(matches!(
            CodecPair::for_format(OutputFormat::Png),
            Err(CompressError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_build_ffmpeg_args_mp4() {
        let args = VideoCompressor::build_ffmpeg_args(
            Path::new("/media/in.mov"),
            Path::new("/media/.tmp.mp4"),
            Some((1280, 720)),
            OutputFormat::Mp4,
            1500,
        )
        .unwrap();

        let joined = args.join(" ");
        assert!(joined.contains("-i /media/in.mov"));
        assert!(joined.contains("-vf scale=1280:720"));
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-b:v 1500k"));
        assert!(joined.contains("-c:a aac"));
        assert!(joined.contains("-f mp4"));
        assert_eq!(args.last().map(String::as_str), Some("/media/.tmp.mp4"));
    }

    #[test]
    fn test_build_ffmpeg_args_webm() {
        let args = VideoCompressor::build_ffmpeg_args(
            Path::new("in.mp4"),
            Path::new("out.webm"),
            None,
            OutputFormat::Webm,
            800,
        )
        .unwrap();

        let joined = args.join(" ");
        assert!(!joined.contains("-vf"));
        assert!(joined.contains("-c:v libvpx-vp9"));
        assert!(joined.contains("-c:a libvorbis"));
        assert!(joined.contains("-f webm"));
        assert!(!joined.contains("libx264"));
    }

    #[test]
    fn test_parse_probe_output() {
        let json = br#"{"programs":[],"streams":[{"width":1920,"height":1080}]}"#;
        assert_eq!(parse_probe_output(json).unwrap(), (1920, 1080));

        let empty = br#"{"streams":[]}"#;
        assert!(matches!(parse_probe_output(empty), Err(CompressError::DecodeFailure(_))));
        assert!(matches!(parse_probe_output(b"not json"), Err(CompressError::DecodeFailure(_))));
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr = b"a\nb\n\nc\nd\ne\nf\ng\n";
        assert_eq!(stderr_tail(stderr), "c | d | e | f | g");
    }

    #[tokio::test]
    async fn test_missing_tools_fail_without_leftovers() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("clip.mp4");
        fs::write(&input, b"\x00\x00\x00\x18ftypmp42").unwrap();

        let tools = ToolSettings {
            ffmpeg: temp_dir.path().join("no-such-ffmpeg"),
            ffprobe: temp_dir.path().join("no-such-ffprobe"),
            encode_timeout_secs: 5,
        };
        let candidate = CandidateFile {
            absolute_path: input.clone(),
            detected_mime_type: "video/mp4".to_string(),
            extension: "mp4".to_string(),
            size_bytes: 12,
            category: MediaCategory::Video,
        };
        let policy = CompressionPolicy::new(OutputFormat::Webm, 720, QualitySetting::BitrateKbps(800)).unwrap();

        let compressor = VideoCompressor::new(tools);
        assert!(!compressor.is_ffmpeg_available().await);

        let result = compressor.compress(&candidate, &policy).await;
        assert!(matches!(result, CompressionResult::Failed { reason: CompressError::DecodeFailure(_) }));
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_image_policy_is_rejected_before_probing() {
        let candidate = CandidateFile {
            absolute_path: PathBuf::from("/nonexistent/clip.mp4"),
            detected_mime_type: "video/mp4".to_string(),
            extension: "mp4".to_string(),
            size_bytes: 0,
            category: MediaCategory::Video,
        };
        let policy = CompressionPolicy::new(OutputFormat::Jpeg, 720, QualitySetting::Quality(70)).unwrap();

        let result = VideoCompressor::new(ToolSettings::default()).compress(&candidate, &policy).await;
        assert!(matches!(result, CompressionResult::Failed { reason: CompressError::UnsupportedFormat(_) }));
    }
}
