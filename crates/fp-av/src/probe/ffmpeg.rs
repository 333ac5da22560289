//! FFmpeg/FFprobe-based [`Prober`] implementation.
//!
//! The capability table comes from `ffmpeg -hide_banner -pix_fmts`; source
//! metadata comes from `ffprobe ... -of json`, mapped through serde.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use fp_core::{FormatTable, SourceMetadata, DEFAULT_FPS};
use serde::Deserialize;

use super::{is_image_format, parse_frame_rate, parse_pix_fmts, Prober};
use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// A prober backed by the `ffmpeg` and `ffprobe` CLIs.
#[derive(Debug, Clone)]
pub struct FfmpegProber {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
    timeout: Duration,
}

impl FfmpegProber {
    /// Create a new prober using explicit tool paths.
    pub fn new(ffmpeg_path: PathBuf, ffprobe_path: PathBuf, timeout: Duration) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            timeout,
        }
    }

    /// Create a prober from a discovered [`ToolRegistry`].
    pub fn from_registry(tools: &ToolRegistry) -> fp_core::Result<Self> {
        let ffmpeg = tools.require("ffmpeg")?;
        let ffprobe = tools.require("ffprobe")?;
        Ok(Self::new(
            ffmpeg.path.clone(),
            ffprobe.path.clone(),
            ffprobe.timeout,
        ))
    }

    fn ffprobe(&self) -> ToolCommand {
        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.timeout(self.timeout);
        cmd.args(["-v", "error", "-select_streams", "v:0"]);
        cmd
    }

    async fn count_frames(&self, path: &Path) -> fp_core::Result<Option<u64>> {
        let mut cmd = self.ffprobe();
        cmd.args([
            "-count_frames",
            "-show_entries",
            "stream=nb_read_frames",
            "-of",
            "json",
        ]);
        cmd.arg(path.to_string_lossy().as_ref());
        let output = cmd.execute().await?;
        Ok(parse_frame_count(&output.stdout))
    }
}

#[async_trait]
impl Prober for FfmpegProber {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn list_formats(&self) -> fp_core::Result<FormatTable> {
        let mut cmd = ToolCommand::new(self.ffmpeg_path.clone());
        cmd.timeout(self.timeout);
        cmd.args(["-hide_banner", "-pix_fmts"]);
        let output = cmd.execute().await?;
        let table = parse_pix_fmts(&output.stdout)?;
        tracing::debug!("ffmpeg reports {} pixel formats", table.len());
        Ok(table)
    }

    async fn probe_source(&self, path: &Path) -> fp_core::Result<SourceMetadata> {
        let mut cmd = self.ffprobe();
        cmd.args([
            "-show_entries",
            "format=format_name:stream=width,height,r_frame_rate",
            "-of",
            "json",
        ]);
        cmd.arg(path.to_string_lossy().as_ref());
        let output = cmd.execute().await.map_err(|e| {
            fp_core::Error::Probe(format!("could not probe {}: {e}", path.display()))
        })?;

        let mut metadata = parse_stream_info(&output.stdout)
            .map_err(|e| fp_core::Error::Probe(format!("{}: {e}", path.display())))?;

        if !metadata.is_image {
            metadata.total_frames = match self.count_frames(path).await {
                Ok(count) => count,
                Err(e) => {
                    tracing::warn!("Frame count unavailable for {}: {e}", path.display());
                    None
                }
            };
        }

        tracing::debug!(
            "Probed {}: {}x{} @ {:.3} fps, format={}, frames={:?}",
            path.display(),
            metadata.width,
            metadata.height,
            metadata.fps,
            metadata.format_name,
            metadata.total_frames
        );
        Ok(metadata)
    }
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    nb_read_frames: Option<String>,
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn parse_stream_info(json: &str) -> Result<SourceMetadata, String> {
    let output: FfprobeOutput =
        serde_json::from_str(json).map_err(|e| format!("ffprobe JSON parse error: {e}"))?;

    let format_name = output
        .format
        .and_then(|f| f.format_name)
        .unwrap_or_default();
    let stream = output
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| "no video stream".to_string())?;

    let width = stream.width.unwrap_or(0);
    let height = stream.height.unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(format!("video stream has no usable dimensions ({width}x{height})"));
    }

    Ok(SourceMetadata {
        is_image: is_image_format(&format_name),
        format_name,
        width,
        height,
        fps: stream
            .r_frame_rate
            .as_deref()
            .and_then(parse_frame_rate)
            .unwrap_or(DEFAULT_FPS),
        total_frames: None,
    })
}

fn parse_frame_count(json: &str) -> Option<u64> {
    let output: FfprobeOutput = serde_json::from_str(json).ok()?;
    output
        .streams
        .into_iter()
        .next()?
        .nb_read_frames?
        .trim()
        .parse()
        .ok()
}
