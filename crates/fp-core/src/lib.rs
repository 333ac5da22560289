//! fp-core: shared types, IDs, errors, configuration, and event system.
//!
//! This crate is the foundational dependency for the other framepump crates,
//! providing the unified error type, the playback data model (frames, pixel
//! formats, source metadata, resolved geometry), configuration, and the
//! playback event bus.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use media::*;
