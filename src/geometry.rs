//! Output geometry and timing resolution.
//!
//! [`resolve`] combines a [`PlaybackConfig`], the probed [`SourceMetadata`]
//! and the capability [`FormatTable`] into the [`ResolvedGeometry`] a
//! session runs with. It is pure; the caller decides whether to write
//! derived dimensions back into its configuration.

use fp_core::config::PlaybackConfig;
use fp_core::{Error, FormatTable, ResolvedGeometry, Result, SourceMetadata};

/// Resolve output size, frame size and pacing rate for one session.
///
/// Dimensions follow the configured width/height:
/// both unset takes the intrinsic size, one set derives the other from the
/// intrinsic aspect ratio (rounded, at least 1), both set are used verbatim.
///
/// # Errors
///
/// [`Error::Format`] when the pixel format is not in `formats` or its
/// bits-per-pixel is unknown or zero (hardware surface formats).
pub fn resolve(
    config: &PlaybackConfig,
    metadata: &SourceMetadata,
    formats: &FormatTable,
) -> Result<ResolvedGeometry> {
    let bits_per_pixel = bits_per_pixel(formats, &config.pixel_format)?;
    let (width, height) = output_size(config.width, config.height, metadata);

    let effective_fps = config.fps.unwrap_or(metadata.fps) * config.speed;
    let total_frames = metadata
        .total_frames
        .map(|total| (total as f64 / config.speed).floor() as u64);

    Ok(ResolvedGeometry {
        width,
        height,
        effective_fps,
        frame_byte_size: frame_byte_size(width, height, bits_per_pixel),
        total_frames,
    })
}

/// `ceil(width * height * bits_per_pixel / 8)`.
pub fn frame_byte_size(width: u32, height: u32, bits_per_pixel: u32) -> usize {
    let bits = u64::from(width) * u64::from(height) * u64::from(bits_per_pixel);
    bits.div_ceil(8) as usize
}

fn bits_per_pixel(formats: &FormatTable, name: &str) -> Result<u32> {
    let format = formats
        .get(name)
        .ok_or_else(|| Error::Format(format!("unsupported pixel format: {name}")))?;
    match format.bits_per_pixel {
        Some(0) => Err(Error::Format(format!(
            "format {name} has no addressable pixels (0 bits per pixel)"
        ))),
        Some(bpp) => Ok(bpp),
        None => Err(Error::Format(format!(
            "bits per pixel unknown for format: {name}"
        ))),
    }
}

fn output_size(width: Option<u32>, height: Option<u32>, meta: &SourceMetadata) -> (u32, u32) {
    match (width, height) {
        (None, None) => (meta.width, meta.height),
        (Some(w), None) => (w, scale(meta.height, w, meta.width)),
        (None, Some(h)) => (scale(meta.width, h, meta.height), h),
        (Some(w), Some(h)) => (w, h),
    }
}

/// `round(value * num / den)`, clamped to at least 1.
fn scale(value: u32, num: u32, den: u32) -> u32 {
    if den == 0 {
        return 1;
    }
    let scaled = (f64::from(value) * f64::from(num) / f64::from(den)).round();
    (scaled as u32).max(1)
}
