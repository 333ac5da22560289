//! Unified error type for framepump.
//!
//! Every crate funnels its failures into [`Error`]. Errors raised before a
//! decode process is live (construction, reconfiguration, probing) are
//! returned to the caller; errors raised afterwards travel through the
//! `error` playback event as their display string.

/// Unified error type covering all failure modes in framepump.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Constructor or reconfiguration input failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Source metadata or capability query failed.
    #[error("Probe error: {0}")]
    Probe(String),

    /// Pixel format unsupported, or its bits-per-pixel is unresolvable.
    #[error("Format error: {0}")]
    Format(String),

    /// An external tool could not be run, failed, or produced output we
    /// could not understand.
    #[error("Tool error [{tool}]: {message}")]
    ToolInvocation {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// The decode process could not be launched.
    #[error("Spawn error [{tool}]: {message}")]
    ProcessSpawn {
        /// Name of the tool that failed to launch.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Fetching a remote source failed.
    #[error("Acquisition error [{url}]: {message}")]
    Acquisition {
        /// The URL being fetched.
        url: String,
        /// Human-readable error description.
        message: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// Convenience constructor for [`Error::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// Convenience constructor for [`Error::ToolInvocation`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ToolInvocation {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::ProcessSpawn`].
    pub fn spawn(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ProcessSpawn {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Acquisition`].
    pub fn acquisition(url: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Acquisition {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Whether this error is raised by configuration input rather than by the
    /// environment (tools, files, network).
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display() {
        let err = Error::validation("speed must be > 0");
        assert_eq!(err.to_string(), "Validation error: speed must be > 0");
        assert!(err.is_validation());
    }

    #[test]
    fn probe_display() {
        let err = Error::Probe("no video stream".into());
        assert_eq!(err.to_string(), "Probe error: no video stream");
        assert!(!err.is_validation());
    }

    #[test]
    fn format_display() {
        let err = Error::Format("pixel format not found: foo".into());
        assert_eq!(err.to_string(), "Format error: pixel format not found: foo");
    }

    #[test]
    fn tool_display() {
        let err = Error::tool("ffmpeg", "unexpected -pix_fmts output");
        assert_eq!(
            err.to_string(),
            "Tool error [ffmpeg]: unexpected -pix_fmts output"
        );
    }

    #[test]
    fn spawn_display() {
        let err = Error::spawn("ffmpeg", "No such file or directory");
        assert_eq!(
            err.to_string(),
            "Spawn error [ffmpeg]: No such file or directory"
        );
    }

    #[test]
    fn acquisition_display() {
        let err = Error::acquisition("https://example.com/a.mp4", "HTTP 404");
        assert_eq!(
            err.to_string(),
            "Acquisition error [https://example.com/a.mp4]: HTTP 404"
        );
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
    }
}
