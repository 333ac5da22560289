//! The pair of tool-facing services a player runs on.

use std::fmt;
use std::sync::Arc;

use fp_av::{Decoder, FfmpegDecoder, FfmpegProber, Prober, ToolRegistry};
use fp_core::config::ToolsConfig;
use fp_core::{FormatTable, Result};

/// Prober, decoder and the capability table queried once at load time.
///
/// Cloning is cheap and shares everything, so one backend can serve any
/// number of players.
#[derive(Clone)]
pub struct MediaBackend {
    prober: Arc<dyn Prober>,
    decoder: Arc<dyn Decoder>,
    formats: Arc<FormatTable>,
}

impl MediaBackend {
    /// Query the capability table from `prober` and bundle it with both
    /// services.
    pub async fn load(prober: Arc<dyn Prober>, decoder: Arc<dyn Decoder>) -> Result<Self> {
        let formats = prober.list_formats().await?;
        tracing::debug!(
            "Loaded {} pixel formats from {} prober",
            formats.len(),
            prober.name()
        );
        Ok(Self::with_formats(prober, decoder, formats))
    }

    /// Bundle services with an already known capability table.
    pub fn with_formats(
        prober: Arc<dyn Prober>,
        decoder: Arc<dyn Decoder>,
        formats: FormatTable,
    ) -> Self {
        Self {
            prober,
            decoder,
            formats: Arc::new(formats),
        }
    }

    /// Discover ffmpeg and ffprobe and load the backend they provide.
    pub async fn ffmpeg(tools: &ToolsConfig) -> Result<Self> {
        let registry = ToolRegistry::discover(tools);
        let prober = FfmpegProber::from_registry(&registry)?;
        let decoder = FfmpegDecoder::from_registry(&registry)?;
        Self::load(Arc::new(prober), Arc::new(decoder)).await
    }

    pub fn prober(&self) -> &dyn Prober {
        self.prober.as_ref()
    }

    pub fn decoder(&self) -> &dyn Decoder {
        self.decoder.as_ref()
    }

    pub fn formats(&self) -> &FormatTable {
        &self.formats
    }
}

impl fmt::Debug for MediaBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaBackend")
            .field("prober", &self.prober.name())
            .field("decoder", &self.decoder.name())
            .field("formats", &self.formats.len())
            .finish()
    }
}
