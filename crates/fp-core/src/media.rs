//! Playback data model: pixel formats, source metadata, resolved geometry,
//! and frames.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ---------------------------------------------------------------------------
// PixelFormat / FormatTable
// ---------------------------------------------------------------------------

/// A raw pixel encoding advertised by the decode tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelFormat {
    /// Format name as understood by the decode tool (e.g. `rgb24`).
    pub name: String,
    /// Bits per pixel, if the tool reported a usable number.
    pub bits_per_pixel: Option<u32>,
}

impl PixelFormat {
    pub fn new(name: impl Into<String>, bits_per_pixel: Option<u32>) -> Self {
        Self {
            name: name.into(),
            bits_per_pixel,
        }
    }
}

/// The decode tool's capability table, in the order the tool listed it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormatTable {
    formats: Vec<PixelFormat>,
}

impl FormatTable {
    pub fn new(formats: Vec<PixelFormat>) -> Self {
        Self { formats }
    }

    /// Look up a format by exact name.
    pub fn get(&self, name: &str) -> Option<&PixelFormat> {
        self.formats.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.formats.iter().map(|f| f.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &PixelFormat> {
        self.formats.iter()
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

impl FromIterator<PixelFormat> for FormatTable {
    fn from_iter<T: IntoIterator<Item = PixelFormat>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// SourceMetadata
// ---------------------------------------------------------------------------

/// Frame rate assumed when the source does not report one.
pub const DEFAULT_FPS: f64 = 30.0;

/// Intrinsic properties of a source, fetched once per playback start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Container / demuxer name reported by the probe (e.g. `png_pipe`).
    pub format_name: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Decodable frame count, when a count scan succeeded.
    pub total_frames: Option<u64>,
    /// Whether the source is a still image (no pacing, single frame).
    pub is_image: bool,
}

// ---------------------------------------------------------------------------
// ResolvedGeometry
// ---------------------------------------------------------------------------

/// Output geometry and timing derived at the start of each session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedGeometry {
    pub width: u32,
    pub height: u32,
    /// Frames per second the scheduler paces at (already speed-adjusted).
    pub effective_fps: f64,
    /// Exact byte length of every emitted [`Frame`].
    pub frame_byte_size: usize,
    /// Expected number of frames after speed adjustment, if known.
    pub total_frames: Option<u64>,
}

/// Longest period the scheduler will wait between two frames.
pub const MAX_FRAME_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

impl ResolvedGeometry {
    /// Period between paced frames, or `None` when the rate cannot drive a
    /// timer.
    ///
    /// Rates too high for nanosecond resolution pace at one frame per
    /// nanosecond. Rates slower than one frame per [`MAX_FRAME_PERIOD`]
    /// cannot be paced.
    pub fn frame_period(&self) -> Option<Duration> {
        if !(self.effective_fps.is_finite() && self.effective_fps > 0.0) {
            return None;
        }
        let period = Duration::try_from_secs_f64(1.0 / self.effective_fps).ok()?;
        (period <= MAX_FRAME_PERIOD).then(|| period.max(Duration::from_nanos(1)))
    }
}

impl fmt::Display for ResolvedGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} @ {:.3} fps ({} bytes/frame)",
            self.width, self.height, self.effective_fps, self.frame_byte_size
        )
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One fixed-size raw pixel buffer in the configured pixel format.
///
/// Cloning is cheap: the pixel data is reference counted and never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    sequence: u64,
    data: Bytes,
}

impl Frame {
    pub fn new(sequence: u64, data: Bytes) -> Self {
        Self { sequence, data }
    }

    /// Zero-based position of this frame within its session.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("len", &self.data.len())
            .finish()
    }
}
