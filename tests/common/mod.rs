//! Shared test harness for integration tests.
//!
//! Provides [`ScriptedProber`] and [`ScriptedDecoder`], in-process stand-ins
//! for ffprobe and ffmpeg, plus [`TestHarness`] which wires them into a
//! [`MediaBackend`]. The decoder replays a fixed script of output chunks and
//! an exit code, and counts how many of its processes are alive.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use fp_av::{DecodeEvent, DecodeProcess, DecodeRequest, Decoder, Prober};
use fp_core::{FormatTable, PixelFormat, SourceMetadata};
use framepump::{MediaBackend, PlaybackConfig, PlaybackEvent, Player};

// ---------------------------------------------------------------------------
// Prober
// ---------------------------------------------------------------------------

pub struct ScriptedProber {
    formats: FormatTable,
    metadata: Mutex<Option<SourceMetadata>>,
    delay: Mutex<Duration>,
    pub probes: AtomicUsize,
}

impl ScriptedProber {
    pub fn new(metadata: SourceMetadata) -> Self {
        Self {
            formats: formats(),
            metadata: Mutex::new(Some(metadata)),
            delay: Mutex::new(Duration::ZERO),
            probes: AtomicUsize::new(0),
        }
    }

    /// A prober whose every metadata query fails.
    pub fn failing() -> Self {
        let prober = Self::new(video(4, 2, 10.0, None));
        *prober.metadata.lock() = None;
        prober
    }

    /// Make every metadata query take `delay` (tokio time).
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn list_formats(&self) -> fp_core::Result<FormatTable> {
        Ok(self.formats.clone())
    }

    async fn probe_source(&self, path: &Path) -> fp_core::Result<SourceMetadata> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.metadata
            .lock()
            .clone()
            .ok_or_else(|| fp_core::Error::Probe(format!("cannot read {}", path.display())))
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// What each spawned process does.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub diagnostics: Vec<String>,
    pub chunks: Vec<Bytes>,
    pub exit_code: Option<i32>,
    /// Never exit after writing the chunks.
    pub hang: bool,
    /// Fail to launch with this message.
    pub fail: Option<String>,
}

impl Script {
    /// Emit `data` in chunks of `chunk_len` bytes, then exit with `code`.
    pub fn bytes(data: &[u8], chunk_len: usize, code: i32) -> Self {
        Self {
            chunks: data
                .chunks(chunk_len)
                .map(Bytes::copy_from_slice)
                .collect(),
            exit_code: Some(code),
            ..Self::default()
        }
    }

    /// `count` frames of `frame_size` bytes, frame `n` filled with byte `n`.
    pub fn frames(count: usize, frame_size: usize, code: i32) -> Self {
        let data: Vec<u8> = (0..count)
            .flat_map(|n| std::iter::repeat(n as u8).take(frame_size))
            .collect();
        Self::bytes(&data, frame_size.max(1) + 3, code)
    }
}

pub struct ScriptedDecoder {
    script: Mutex<Script>,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
    pub spawned: AtomicUsize,
    pub requests: Mutex<Vec<DecodeRequest>>,
}

impl ScriptedDecoder {
    pub fn new(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            live: Arc::new(AtomicUsize::new(0)),
            max_live: Arc::new(AtomicUsize::new(0)),
            spawned: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock() = script;
    }

    /// Processes spawned and not yet finished or killed.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously live processes seen.
    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<DecodeRequest> {
        self.requests.lock().last().cloned()
    }
}

/// Counts one live process for as long as it is held.
struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Decoder for ScriptedDecoder {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn spawn(&self, request: &DecodeRequest) -> DecodeProcess {
        self.requests.lock().push(request.clone());
        let n = self.spawned.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().clone();

        if let Some(message) = &script.fail {
            return DecodeProcess::failed(message.clone());
        }

        let now_live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(now_live, Ordering::SeqCst);
        let guard = LiveGuard(Arc::clone(&self.live));

        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let feed = async move {
                for line in script.diagnostics {
                    if tx.send(DecodeEvent::Diagnostic(line)).await.is_err() {
                        return;
                    }
                }
                for chunk in script.chunks {
                    if tx.send(DecodeEvent::Output(chunk)).await.is_err() {
                        return;
                    }
                }
                if script.hang {
                    std::future::pending::<()>().await;
                }
                let _ = tx.send(DecodeEvent::Exited(script.exit_code)).await;
            };
            tokio::select! {
                _ = token.cancelled() => {}
                _ = feed => {}
            }
        });

        DecodeProcess::new(rx, cancel, Some(4000 + n as u32))
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn formats() -> FormatTable {
    FormatTable::new(vec![
        PixelFormat::new("gray", Some(8)),
        PixelFormat::new("rgb24", Some(24)),
        PixelFormat::new("yuv420p", Some(12)),
        PixelFormat::new("mystery", None),
    ])
}

pub fn video(width: u32, height: u32, fps: f64, total_frames: Option<u64>) -> SourceMetadata {
    SourceMetadata {
        format_name: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
        width,
        height,
        fps,
        total_frames,
        is_image: false,
    }
}

pub fn image(width: u32, height: u32) -> SourceMetadata {
    SourceMetadata {
        format_name: "png_pipe".to_string(),
        width,
        height,
        fps: 25.0,
        total_frames: None,
        is_image: true,
    }
}

/// A scripted backend plus handles on its fakes.
pub struct TestHarness {
    pub prober: Arc<ScriptedProber>,
    pub decoder: Arc<ScriptedDecoder>,
}

impl TestHarness {
    pub fn new(metadata: SourceMetadata, script: Script) -> Self {
        Self::with_prober(ScriptedProber::new(metadata), script)
    }

    pub fn with_prober(prober: ScriptedProber, script: Script) -> Self {
        Self {
            prober: Arc::new(prober),
            decoder: Arc::new(ScriptedDecoder::new(script)),
        }
    }

    pub fn backend(&self) -> MediaBackend {
        MediaBackend::with_formats(
            Arc::clone(&self.prober) as Arc<dyn Prober>,
            Arc::clone(&self.decoder) as Arc<dyn Decoder>,
            formats(),
        )
    }

    pub fn player(&self, config: PlaybackConfig) -> Player {
        Player::new(config, self.backend()).expect("valid test config")
    }
}

/// 4x2 gray, 8 bytes per frame.
pub fn gray_4x2() -> PlaybackConfig {
    PlaybackConfig::new("clip.mp4", "gray")
}

// ---------------------------------------------------------------------------
// Event helpers
// ---------------------------------------------------------------------------

/// Next event, failing the test if none arrives within a minute of (paused)
/// tokio time.
pub async fn next_event(rx: &mut broadcast::Receiver<PlaybackEvent>) -> PlaybackEvent {
    tokio::time::timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("timed out waiting for a playback event")
        .expect("event channel closed")
}

/// Next frame's sequence number, failing on any other event.
pub async fn next_frame(rx: &mut broadcast::Receiver<PlaybackEvent>) -> u64 {
    match next_event(rx).await {
        PlaybackEvent::Frame(frame) => frame.sequence(),
        other => panic!("expected a frame, got {other:?}"),
    }
}

/// Everything already published, without waiting.
pub fn drain(rx: &mut broadcast::Receiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
