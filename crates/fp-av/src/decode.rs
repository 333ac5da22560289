//! Decode process supervision.
//!
//! A [`Decoder`] launches one external process per playback session and
//! returns a [`DecodeProcess`]: a single ordered stream of [`DecodeEvent`]s
//! (raw output chunks, diagnostic lines, and finally an exit code or a
//! launch failure) plus a kill switch.
//!
//! [`FfmpegDecoder`] is the production implementation. Its supervisor task
//! owns the child, drains stdout and stderr concurrently, and reports the
//! exit code only after both pipes reach end-of-file, so every output byte
//! is delivered before [`DecodeEvent::Exited`].

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Number of undelivered events buffered per process before the reader
/// stops pulling from the pipes.
const EVENT_BUFFER: usize = 64;

/// Read size for the raw output pipe.
const READ_CHUNK: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// DecodeRequest
// ---------------------------------------------------------------------------

/// Everything a decoder needs to produce raw frames for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeRequest {
    pub source: PathBuf,
    pub width: u32,
    pub height: u32,
    pub pixel_format: String,
    pub speed: f64,
    pub is_image: bool,
    /// Seconds into the source to start decoding at (`0` = beginning).
    pub start_time: f64,
    /// Seconds into the source to stop decoding at.
    pub end_time: Option<f64>,
}

impl DecodeRequest {
    /// Presentation timestamp scale applied to motion sources, or `None`
    /// when timestamps are left alone (still images, speed 1).
    pub fn timestamp_rate_factor(&self) -> Option<f64> {
        if self.is_image || self.speed == 1.0 {
            None
        } else {
            Some(1.0 / self.speed)
        }
    }
}

// ---------------------------------------------------------------------------
// DecodeEvent / DecodeProcess
// ---------------------------------------------------------------------------

/// One observation from a running decode process, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeEvent {
    /// A chunk of raw pixel bytes (arbitrary length, not frame aligned).
    Output(Bytes),
    /// One non-empty line of diagnostic text.
    Diagnostic(String),
    /// The process terminated; `None` when it was killed by a signal.
    Exited(Option<i32>),
    /// The process could not be launched. No `Exited` follows.
    Failed(String),
}

/// Handle to one live (or finished) decode process.
///
/// Dropping the handle kills the process.
#[derive(Debug)]
pub struct DecodeProcess {
    events: mpsc::Receiver<DecodeEvent>,
    cancel: CancellationToken,
    pid: Option<u32>,
}

impl DecodeProcess {
    /// Assemble a handle from its parts. Decoder implementations keep the
    /// sending half of `events` and watch `cancel` to know when to kill.
    pub fn new(
        events: mpsc::Receiver<DecodeEvent>,
        cancel: CancellationToken,
        pid: Option<u32>,
    ) -> Self {
        Self { events, cancel, pid }
    }

    /// A handle for a process that never started.
    pub fn failed(message: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::channel(1);
        // Capacity 1 and a fresh channel: this send cannot fail.
        let _ = tx.try_send(DecodeEvent::Failed(message.into()));
        Self::new(rx, CancellationToken::new(), None)
    }

    /// OS process id, if the process was launched.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for the next event. `None` once the process is gone and every
    /// event has been delivered.
    pub async fn next_event(&mut self) -> Option<DecodeEvent> {
        self.events.recv().await
    }

    /// Forcibly terminate the process. Safe to call repeatedly or after the
    /// process has exited.
    pub fn kill(&self) {
        self.cancel.cancel();
    }

    /// Whether [`kill`](Self::kill) has been requested.
    pub fn is_killed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for DecodeProcess {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Launches decode processes.
///
/// `spawn` never fails synchronously: launch failures are reported as
/// [`DecodeEvent::Failed`] on the returned handle, because they are observed
/// after the caller has already committed to the session.
pub trait Decoder: Send + Sync {
    /// Human-readable name identifying this decoder implementation.
    fn name(&self) -> &'static str;

    /// Launch a process for `request`. Must be called inside a tokio runtime.
    fn spawn(&self, request: &DecodeRequest) -> DecodeProcess;
}

/// A [`Decoder`] that runs `ffmpeg ... -f rawvideo -`.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    ffmpeg_path: PathBuf,
}

impl FfmpegDecoder {
    pub fn new(ffmpeg_path: PathBuf) -> Self {
        Self { ffmpeg_path }
    }

    /// Create a decoder from a discovered [`ToolRegistry`].
    pub fn from_registry(tools: &ToolRegistry) -> fp_core::Result<Self> {
        Ok(Self::new(tools.require("ffmpeg")?.path.clone()))
    }

    /// Path of the ffmpeg binary this decoder launches.
    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    /// Build the full ffmpeg command for `request`.
    pub fn command(&self, request: &DecodeRequest) -> ToolCommand {
        let mut cmd = ToolCommand::new(self.ffmpeg_path.clone());
        cmd.args(["-nostdin", "-loglevel", "info"]);
        if request.start_time > 0.0 {
            cmd.args(["-ss".to_string(), format_seconds(request.start_time)]);
        }
        cmd.arg("-i");
        cmd.arg(request.source.to_string_lossy().as_ref());
        if let Some(end) = request.end_time {
            cmd.args(["-to".to_string(), format_seconds(end)]);
        }
        cmd.arg("-an");

        let mut filters = vec![format!("scale={}:{}", request.width, request.height)];
        if let Some(factor) = request.timestamp_rate_factor() {
            filters.push(format!("setpts={factor:.3}*PTS"));
        }
        cmd.args(["-vf".to_string(), filters.join(",")]);

        cmd.args(["-pix_fmt", request.pixel_format.as_str()]);
        cmd.args(["-s".to_string(), format!("{}x{}", request.width, request.height)]);
        cmd.args(["-f", "rawvideo", "-"]);
        cmd
    }
}

impl Decoder for FfmpegDecoder {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn spawn(&self, request: &DecodeRequest) -> DecodeProcess {
        let cmd = self.command(request);
        tracing::debug!("Spawning ffmpeg {}", cmd.get_args().join(" "));

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!("Failed to launch decode process: {e}");
                return DecodeProcess::failed(e.to_string());
            }
        };

        let pid = child.id();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        tokio::spawn(supervise(child, tx, cancel.clone()));

        DecodeProcess::new(rx, cancel, pid)
    }
}

fn format_seconds(secs: f64) -> String {
    format!("{secs:.3}")
}

/// Own `child` until it exits or `cancel` fires.
async fn supervise(mut child: Child, tx: mpsc::Sender<DecodeEvent>, cancel: CancellationToken) {
    let pid = child.id();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let drain = async {
        tokio::join!(
            forward_output(stdout, tx.clone()),
            forward_diagnostics(stderr, tx.clone())
        );
        child.wait().await
    };

    tokio::select! {
        biased;

        _ = cancel.cancelled() => {}
        status = drain => {
            let code = match status {
                Ok(status) => status.code(),
                Err(e) => {
                    tracing::warn!("Failed to wait for decode process {pid:?}: {e}");
                    None
                }
            };
            tracing::debug!("Decode process {pid:?} exited with {code:?}");
            let _ = tx.send(DecodeEvent::Exited(code)).await;
            return;
        }
    }

    // Killed: the drain future (and its borrow of `child`) is gone here.
    if let Err(e) = child.start_kill() {
        tracing::debug!("Decode process {pid:?} already gone: {e}");
    }
    let _ = child.wait().await;
    tracing::debug!("Decode process {pid:?} killed");
}

async fn forward_output(
    stdout: Option<tokio::process::ChildStdout>,
    tx: mpsc::Sender<DecodeEvent>,
) {
    let Some(mut stdout) = stdout else { return };
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx
                    .send(DecodeEvent::Output(Bytes::copy_from_slice(&buf[..n])))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("Error reading decode output: {e}");
                break;
            }
        }
    }
}

async fn forward_diagnostics(
    stderr: Option<tokio::process::ChildStderr>,
    tx: mpsc::Sender<DecodeEvent>,
) {
    let Some(stderr) = stderr else { return };
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                // Metadata lines are not always UTF-8.
                let line = String::from_utf8_lossy(&buf);
                // ffmpeg redraws its progress line with carriage returns.
                for part in line.split('\r').map(str::trim).filter(|l| !l.is_empty()) {
                    if tx.send(DecodeEvent::Diagnostic(part.to_string())).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Error reading decode diagnostics: {e}");
                break;
            }
        }
    }
}
