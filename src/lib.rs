//! framepump - real-time raw frame playback driven by ffmpeg.
//!
//! A [`Player`] turns an image or video file into a paced stream of
//! fixed-size raw pixel [`Frame`]s, with transport control
//! (start/pause/resume/stop/loop) and live reconfiguration. Decoding is done
//! by an external process; this crate probes the source, supervises the
//! process, cuts its output into frames and releases them on time.
//!
//! ```no_run
//! use framepump::{EventKind, MediaBackend, PlaybackConfig, PlaybackEvent, Player};
//!
//! # async fn example() -> fp_core::Result<()> {
//! let backend = MediaBackend::ffmpeg(&Default::default()).await?;
//! let player = Player::new(PlaybackConfig::new("clip.mp4", "gray"), backend)?;
//! player.on(EventKind::Frame, |event| {
//!     if let PlaybackEvent::Frame(frame) = event {
//!         println!("frame {} ({} bytes)", frame.sequence(), frame.len());
//!     }
//! });
//! player.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod acquire;
pub mod backend;
pub mod demux;
pub mod geometry;
pub mod player;
pub mod scheduler;
pub mod session;

pub use backend::MediaBackend;
pub use fp_core::config::PlaybackConfig;
pub use fp_core::events::{EventKind, ListenerId, PlaybackEvent};
pub use fp_core::{Error, Frame, Result};
pub use player::{Player, Reconfigured, Setting};
pub use scheduler::PlaybackState;
pub use session::SessionInfo;
