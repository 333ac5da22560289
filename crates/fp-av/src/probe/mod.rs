//! Capability and metadata probing.
//!
//! The [`Prober`] trait is the seam between the player and whatever answers
//! "which pixel formats exist?" and "what is in this file?". The production
//! implementation, [`FfmpegProber`], shells out to `ffmpeg -pix_fmts` and
//! `ffprobe`.

pub mod ffmpeg;
pub mod pix_fmts;

use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use fp_core::{FormatTable, SourceMetadata};
use regex::Regex;

pub use self::ffmpeg::FfmpegProber;
pub use self::pix_fmts::parse_pix_fmts;

/// A source of capability and metadata information.
///
/// Implementations must be safe to share across threads (`Send + Sync`).
#[async_trait]
pub trait Prober: Send + Sync {
    /// Human-readable name identifying this prober implementation.
    fn name(&self) -> &'static str;

    /// List the pixel formats the decode tool can emit.
    ///
    /// Fails with [`fp_core::Error::ToolInvocation`] when the tool cannot be
    /// run or its listing is not in the expected shape.
    async fn list_formats(&self) -> fp_core::Result<FormatTable>;

    /// Read the intrinsic geometry, frame rate and (best effort) frame count
    /// of a source.
    ///
    /// Fails with [`fp_core::Error::Probe`]. A failed frame count is not an
    /// error; it leaves [`SourceMetadata::total_frames`] unset.
    async fn probe_source(&self, path: &Path) -> fp_core::Result<SourceMetadata>;
}

static IMAGE_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(image2|png|jpeg|jpg|bmp|gif|webp|tiff)").expect("static regex")
});

/// Whether a probed container/demuxer name denotes a still image.
///
/// Animated formats such as GIF are treated as images too: they emit their
/// first frame only.
pub fn is_image_format(format_name: &str) -> bool {
    IMAGE_FORMAT.is_match(format_name)
}

/// Parse an ffprobe frame rate (`"30000/1001"`, `"25/1"` or `"29.97"`).
///
/// Returns `None` for anything unusable, including a zero denominator.
pub fn parse_frame_rate(rate_str: &str) -> Option<f64> {
    let rate = match rate_str.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate_str.trim().parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_classification() {
        assert!(is_image_format("image2"));
        assert!(is_image_format("png_pipe"));
        assert!(is_image_format("jpeg_pipe"));
        assert!(is_image_format("gif"));
        assert!(is_image_format("webp_pipe"));
        assert!(is_image_format("tiff_pipe"));
        assert!(!is_image_format("mov,mp4,m4a,3gp,3g2,mj2"));
        assert!(!is_image_format("matroska,webm"));
    }

    #[test]
    fn frame_rate_fraction() {
        assert!((parse_frame_rate("24000/1001").unwrap() - 23.976).abs() < 0.01);
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("12.5"), Some(12.5));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("invalid"), None);
    }
}
