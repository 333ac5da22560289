//! The playback session: one decode process plus its pacing timer.

use std::time::Instant;

use fp_core::{ResolvedGeometry, SessionId};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// One run of the decode process and the pacing that follows it.
///
/// The player owns at most one `Session` at a time. Cancelling its token
/// kills the decode process and ends the scheduler task, which owns the
/// frame buffer and timer.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    geometry: ResolvedGeometry,
    is_image: bool,
    pid: Option<u32>,
    cancel: CancellationToken,
    started_at: Instant,
}

impl Session {
    pub fn new(geometry: ResolvedGeometry, is_image: bool, pid: Option<u32>) -> Self {
        Self {
            id: SessionId::new(),
            geometry,
            is_image,
            pid,
            cancel: CancellationToken::new(),
            started_at: Instant::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn geometry(&self) -> &ResolvedGeometry {
        &self.geometry
    }

    pub fn is_image(&self) -> bool {
        self.is_image
    }

    /// A token that fires when the session is cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the session. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            geometry: self.geometry,
            is_image: self.is_image,
            pid: self.pid,
            elapsed_ms: self.started_at.elapsed().as_millis() as u64,
        }
    }
}

/// Point-in-time snapshot of the active session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub geometry: ResolvedGeometry,
    pub is_image: bool,
    /// OS process id of the decode process, if it was launched.
    pub pid: Option<u32>,
    pub elapsed_ms: u64,
}
