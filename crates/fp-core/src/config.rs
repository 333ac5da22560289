//! Configuration types.
//!
//! [`Config`] carries the ambient settings (tool locations, event channel
//! sizing) and is deserialized from JSON; every section defaults sensibly so
//! an empty `{}` file is valid. [`PlaybackConfig`] describes one playback
//! source and is owned by the player for its whole lifetime.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub events: EventsConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Some(ref p) = self.tools.ffmpeg_path {
            if !p.exists() {
                warnings.push(format!(
                    "tools.ffmpeg_path {} does not exist; falling back to PATH",
                    p.display()
                ));
            }
        }
        if let Some(ref p) = self.tools.ffprobe_path {
            if !p.exists() {
                warnings.push(format!(
                    "tools.ffprobe_path {} does not exist; falling back to PATH",
                    p.display()
                ));
            }
        }
        if self.tools.probe_timeout_secs == 0 {
            warnings.push("tools.probe_timeout_secs is 0; probes will time out immediately".into());
        }
        if self.events.channel_capacity == 0 {
            warnings.push(format!(
                "events.channel_capacity is 0; using {DEFAULT_CHANNEL_CAPACITY}"
            ));
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Paths and limits for the external CLI tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    /// Upper bound for metadata and capability queries. The decode process
    /// itself is never timed out.
    pub probe_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            probe_timeout_secs: 300,
        }
    }
}

/// Default broadcast capacity for playback events.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Playback event fan-out settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Buffer size of the broadcast channel handed out by `subscribe()`.
    /// Receivers that fall further behind than this observe a lag.
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl EventsConfig {
    /// Capacity actually used (a zero capacity is not accepted by tokio).
    pub fn effective_capacity(&self) -> usize {
        if self.channel_capacity == 0 {
            DEFAULT_CHANNEL_CAPACITY
        } else {
            self.channel_capacity
        }
    }
}

// ---------------------------------------------------------------------------
// PlaybackConfig
// ---------------------------------------------------------------------------

/// Everything needed to play one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Local file path or `http(s)://` URL.
    pub source: String,
    /// Raw pixel format name, e.g. `rgb24` or `gray`.
    pub pixel_format: String,
    /// Forward decode-process diagnostics to the log.
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default, rename = "loop")]
    pub looping: bool,
    /// Seconds into the source at which decoding starts.
    #[serde(default)]
    pub start_time: f64,
    /// Seconds into the source at which decoding stops.
    #[serde(default)]
    pub end_time: Option<f64>,
    /// Regulated frame rate overriding the source's intrinsic rate.
    #[serde(default)]
    pub fps: Option<f64>,
}

fn default_speed() -> f64 {
    1.0
}

impl PlaybackConfig {
    /// A config with every optional field at its default.
    pub fn new(source: impl Into<String>, pixel_format: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            pixel_format: pixel_format.into(),
            debug: false,
            width: None,
            height: None,
            speed: default_speed(),
            looping: false,
            start_time: 0.0,
            end_time: None,
            fps: None,
        }
    }

    /// Deserialize a `PlaybackConfig` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("playback config parse error: {e}")))
    }

    /// Whether the source names a remote resource that must be fetched first.
    pub fn is_remote(&self) -> bool {
        is_remote_source(&self.source)
    }

    /// Validate every field that can be checked without the decode tool.
    ///
    /// Fields are checked in declaration order and the first failure is
    /// returned. Pixel format membership is checked by the player against
    /// the capability table.
    pub fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            return Err(Error::validation("source must not be empty"));
        }
        if self.pixel_format.trim().is_empty() {
            return Err(Error::validation("pixel_format must not be empty"));
        }
        validate_dimension("width", self.width)?;
        validate_dimension("height", self.height)?;
        validate_speed(self.speed)?;
        validate_start_time(self.start_time)?;
        validate_end_time(self.end_time)?;
        validate_fps(self.fps)?;
        Ok(())
    }
}

/// Whether `source` is an `http://` or `https://` URL.
pub fn is_remote_source(source: &str) -> bool {
    let lower = source.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

pub fn validate_dimension(name: &str, value: Option<u32>) -> Result<()> {
    match value {
        Some(0) => Err(Error::validation(format!("{name} must be > 0 or unset"))),
        _ => Ok(()),
    }
}

pub fn validate_speed(speed: f64) -> Result<()> {
    if speed.is_finite() && speed > 0.0 {
        Ok(())
    } else {
        Err(Error::validation(format!("speed must be > 0 (got {speed})")))
    }
}

pub fn validate_fps(fps: Option<f64>) -> Result<()> {
    match fps {
        Some(v) if !(v.is_finite() && v > 0.0) => {
            Err(Error::validation(format!("fps must be > 0 or unset (got {v})")))
        }
        _ => Ok(()),
    }
}

pub fn validate_start_time(start_time: f64) -> Result<()> {
    if start_time.is_finite() && start_time >= 0.0 {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "start_time must be a non-negative number of seconds (got {start_time})"
        )))
    }
}

pub fn validate_end_time(end_time: Option<f64>) -> Result<()> {
    match end_time {
        Some(v) if !(v.is_finite() && v >= 0.0) => Err(Error::validation(format!(
            "end_time must be a non-negative number of seconds or unset (got {v})"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_is_valid_config() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config.tools.probe_timeout_secs, 300);
        assert_eq!(config.events.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn malformed_config_is_validation_error() {
        let err = Config::from_json("{ not json").unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let config = Config::load_or_default(Some(Path::new("/nonexistent/framepump.json")));
        assert!(config.tools.ffmpeg_path.is_none());
    }

    #[test]
    fn validate_warns_on_missing_tool_path() {
        let mut config = Config::default();
        config.tools.ffmpeg_path = Some(PathBuf::from("/nonexistent/ffmpeg"));
        config.events.channel_capacity = 0;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("ffmpeg_path"));
        assert_eq!(config.events.effective_capacity(), DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn playback_config_defaults_from_json() {
        let config =
            PlaybackConfig::from_json(r#"{ "source": "clip.mp4", "pixel_format": "gray" }"#)
                .unwrap();
        assert_eq!(config, PlaybackConfig::new("clip.mp4", "gray"));
        assert_eq!(config.speed, 1.0);
        assert!(!config.looping);
    }

    #[test]
    fn playback_config_loop_field_name() {
        let config = PlaybackConfig::from_json(
            r#"{ "source": "clip.mp4", "pixel_format": "gray", "loop": true, "fps": 12.5 }"#,
        )
        .unwrap();
        assert!(config.looping);
        assert_eq!(config.fps, Some(12.5));
    }

    #[test]
    fn validate_reports_first_invalid_field() {
        let mut config = PlaybackConfig::new("clip.mp4", "gray");
        config.width = Some(0);
        config.speed = -1.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("width"), "{err}");

        config.width = None;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("speed"), "{err}");
    }

    #[test]
    fn validate_rejects_bad_numbers() {
        assert!(validate_speed(0.0).is_err());
        assert!(validate_speed(f64::INFINITY).is_err());
        assert!(validate_speed(0.5).is_ok());
        assert!(validate_fps(Some(0.0)).is_err());
        assert!(validate_fps(None).is_ok());
        assert!(validate_start_time(-0.1).is_err());
        assert!(validate_end_time(Some(f64::NAN)).is_err());
        assert!(validate_end_time(Some(3.0)).is_ok());
    }

    #[test]
    fn remote_source_detection() {
        assert!(is_remote_source("https://example.com/a.gif"));
        assert!(is_remote_source("HTTP://example.com/a.gif"));
        assert!(!is_remote_source("ftp://example.com/a.gif"));
        assert!(!is_remote_source("/tmp/http/a.gif"));
    }
}
