//! # fp-av
//!
//! External tool management for framepump: everything that talks to
//! `ffmpeg` and `ffprobe`.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support for short invocations, plus raw spawning for long-lived ones.
//! - **Probing** ([`Prober`], [`FfmpegProber`]) -- the pixel format
//!   capability table and per-source metadata.
//! - **Decoding** ([`Decoder`], [`FfmpegDecoder`]) -- supervised raw-video
//!   processes exposed as an ordered [`DecodeEvent`] stream.

pub mod command;
pub mod decode;
pub mod probe;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use decode::{DecodeEvent, DecodeProcess, DecodeRequest, Decoder, FfmpegDecoder};
pub use probe::{FfmpegProber, Prober};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
