//! Playback scheduling.
//!
//! Each session runs one scheduler task in two phases. While the decode
//! process is alive it *collects*: process output is demultiplexed into a
//! frame queue and diagnostics are optionally logged. Once the process has
//! exited it *paces*: still images publish their single frame at once,
//! everything else is released one frame per tick of a fixed-period timer.
//!
//! The task only holds a weak reference to the player, so dropping the last
//! [`Player`](crate::Player) handle ends playback.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Weak;

use fp_av::{DecodeEvent, DecodeProcess};
use fp_core::events::PlaybackEvent;
use fp_core::{Frame, ResolvedGeometry, SessionId};
use serde::Serialize;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::demux::FrameDemuxer;
use crate::player::Shared;

/// Where a player is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Never started.
    Idle,
    /// Decode process running; frames are being buffered.
    Collecting,
    /// Frames are being released on the pacing timer.
    Running,
    /// Pacing timer still ticking, but ticks release nothing.
    Paused,
    /// The last session ran to completion (or failed to launch).
    Ended,
    /// Stopped by the host.
    Stopped,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Collecting => "collecting",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Ended => "ended",
            Self::Stopped => "stopped",
        }
    }

    /// Whether a session is (or may be) live in this state.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Collecting | Self::Running | Self::Paused)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the scheduler task owns for one session.
pub(crate) struct SessionTask {
    pub id: SessionId,
    pub cancel: CancellationToken,
    pub process: DecodeProcess,
    pub geometry: ResolvedGeometry,
    pub is_image: bool,
}

/// Drive one session from spawn to end.
pub(crate) async fn run(player: Weak<Shared>, task: SessionTask) {
    let SessionTask {
        id,
        cancel,
        mut process,
        geometry,
        is_image,
    } = task;

    let Some((frames, code)) = collect(&player, id, &cancel, &mut process, &geometry).await
    else {
        return;
    };
    drop(process);

    tracing::debug!(
        "Session {id}: decode exited with {code:?} after {} frames",
        frames.len()
    );

    if is_image {
        emit_still(&player, id, frames, code);
    } else {
        pace(&player, id, &cancel, frames, &geometry, code).await;
    }
}

/// Buffer every complete frame the process produces.
///
/// Returns `None` when the session was cancelled, the player is gone, or
/// the process failed to launch (already reported).
async fn collect(
    player: &Weak<Shared>,
    id: SessionId,
    cancel: &CancellationToken,
    process: &mut DecodeProcess,
    geometry: &ResolvedGeometry,
) -> Option<(VecDeque<Frame>, Option<i32>)> {
    let mut demuxer = FrameDemuxer::new(geometry.frame_byte_size);
    let mut frames = VecDeque::new();

    let code = loop {
        let event = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                process.kill();
                return None;
            }
            event = process.next_event() => event,
        };

        match event {
            Some(DecodeEvent::Output(chunk)) => frames.extend(demuxer.push(&chunk)),
            Some(DecodeEvent::Diagnostic(line)) => {
                let shared = player.upgrade()?;
                if shared.debug_enabled() {
                    tracing::info!(target: "ffmpeg", "{line}");
                }
            }
            Some(DecodeEvent::Exited(code)) => break code,
            Some(DecodeEvent::Failed(message)) => {
                player.upgrade()?.fail(id, message);
                return None;
            }
            None => {
                if cancel.is_cancelled() {
                    return None;
                }
                break None;
            }
        }
    };

    demuxer.finish();
    Some((frames, code))
}

fn emit_still(player: &Weak<Shared>, id: SessionId, mut frames: VecDeque<Frame>, code: Option<i32>) {
    let Some(shared) = player.upgrade() else {
        return;
    };
    if let Some(frame) = frames.pop_front() {
        if shared.state_of(id).is_none() {
            return;
        }
        shared.publish(PlaybackEvent::Frame(frame));
    }
    // Still images never loop.
    shared.finish(id, code);
}

async fn pace(
    player: &Weak<Shared>,
    id: SessionId,
    cancel: &CancellationToken,
    mut frames: VecDeque<Frame>,
    geometry: &ResolvedGeometry,
    code: Option<i32>,
) {
    let period = match geometry.frame_period() {
        Some(period) if !frames.is_empty() => period,
        period => {
            if period.is_none() && !frames.is_empty() {
                tracing::warn!(
                    "Session {id}: {:.3e} fps cannot be paced; dropping {} frames",
                    geometry.effective_fps,
                    frames.len()
                );
            }
            if let Some(shared) = player.upgrade() {
                shared.finish(id, code);
            }
            return;
        }
    };

    match player.upgrade() {
        Some(shared) if shared.begin_pacing(id) => {}
        _ => return,
    }
    tracing::debug!(
        "Session {id}: pacing {} frames every {period:?}",
        frames.len()
    );

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let Some(shared) = player.upgrade() else {
            return;
        };
        match shared.state_of(id) {
            None => return,
            Some(PlaybackState::Paused) => continue,
            Some(_) => {}
        }

        match frames.pop_front() {
            Some(frame) => shared.publish(PlaybackEvent::Frame(frame)),
            None => {
                if shared.finish(id, code) {
                    shared.schedule_restart();
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_states() {
        assert!(PlaybackState::Collecting.is_active());
        assert!(PlaybackState::Running.is_active());
        assert!(PlaybackState::Paused.is_active());
        assert!(!PlaybackState::Idle.is_active());
        assert!(!PlaybackState::Ended.is_active());
        assert!(!PlaybackState::Stopped.is_active());
    }

    #[test]
    fn state_names() {
        assert_eq!(PlaybackState::Paused.to_string(), "paused");
        assert_eq!(
            serde_json::to_string(&PlaybackState::Collecting).unwrap(),
            "\"collecting\""
        );
    }
}
