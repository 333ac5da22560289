use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "framepump")]
#[command(author, version, about = "Play images and videos as paced raw pixel frames")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Play a source and write its raw frames out in real time
    Play {
        /// Local file or http(s) URL
        #[arg(required = true)]
        source: String,

        /// Raw pixel format (see `framepump formats`)
        #[arg(short, long, default_value = "rgb24")]
        mode: String,

        /// Output width; height follows the aspect ratio if unset
        #[arg(long)]
        width: Option<u32>,

        /// Output height; width follows the aspect ratio if unset
        #[arg(long)]
        height: Option<u32>,

        /// Playback speed multiplier
        #[arg(long, default_value = "1.0")]
        speed: f64,

        /// Frame rate to pace at instead of the source's own
        #[arg(long)]
        fps: Option<f64>,

        /// Restart from the beginning after each end
        #[arg(long = "loop")]
        looping: bool,

        /// Forward ffmpeg diagnostics to the log
        #[arg(long)]
        debug: bool,

        /// Seconds into the source to start at
        #[arg(long, default_value = "0")]
        start: f64,

        /// Seconds into the source to stop at
        #[arg(long)]
        end: Option<f64>,

        /// File to write frames to (`-` for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
    },

    /// Probe a source and display its geometry and timing
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the pixel formats ffmpeg can produce
    Formats,

    /// Check that required external tools are available
    CheckTools,
}
