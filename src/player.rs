//! The session controller.
//!
//! [`Player`] owns a [`PlaybackConfig`], at most one live [`Session`] and
//! the [`EventBus`] the host listens on. Transport calls (`pause`, `resume`,
//! `stop`) are synchronous and never hold the state lock while listeners
//! run, so they are safe to call from inside a listener.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fp_av::DecodeRequest;
use fp_core::config::{
    validate_dimension, validate_end_time, validate_fps, validate_speed, validate_start_time,
    EventsConfig, PlaybackConfig,
};
use fp_core::events::{EventBus, EventKind, ListenerId, PlaybackEvent};
use fp_core::{Error, FormatTable, Result, SessionId};
use parking_lot::Mutex;
use tempfile::TempPath;
use tokio::sync::broadcast;

use crate::acquire;
use crate::backend::MediaBackend;
use crate::geometry;
use crate::scheduler::{self, PlaybackState, SessionTask};
use crate::session::{Session, SessionInfo};

// ---------------------------------------------------------------------------
// Setting / Reconfigured
// ---------------------------------------------------------------------------

/// A single live change to the playback configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum Setting {
    PixelFormat(String),
    Width(Option<u32>),
    Height(Option<u32>),
    Speed(f64),
    Fps(Option<f64>),
    Loop(bool),
    Debug(bool),
    StartTime(f64),
    EndTime(Option<f64>),
}

impl Setting {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PixelFormat(_) => "pixel_format",
            Self::Width(_) => "width",
            Self::Height(_) => "height",
            Self::Speed(_) => "speed",
            Self::Fps(_) => "fps",
            Self::Loop(_) => "loop",
            Self::Debug(_) => "debug",
            Self::StartTime(_) => "start_time",
            Self::EndTime(_) => "end_time",
        }
    }

    /// Whether an active session must be restarted for the change to take
    /// effect.
    pub fn requires_restart(&self) -> bool {
        matches!(
            self,
            Self::PixelFormat(_) | Self::Width(_) | Self::Height(_) | Self::Speed(_) | Self::Fps(_)
        )
    }

    fn validate(&self, formats: &FormatTable) -> Result<()> {
        match self {
            Self::PixelFormat(name) => validate_pixel_format(formats, name),
            Self::Width(w) => validate_dimension("width", *w),
            Self::Height(h) => validate_dimension("height", *h),
            Self::Speed(s) => validate_speed(*s),
            Self::Fps(f) => validate_fps(*f),
            Self::StartTime(t) => validate_start_time(*t),
            Self::EndTime(t) => validate_end_time(*t),
            Self::Loop(_) | Self::Debug(_) => Ok(()),
        }
    }

    fn apply(self, config: &mut PlaybackConfig) {
        match self {
            Self::PixelFormat(name) => config.pixel_format = name,
            Self::Width(w) => config.width = w,
            Self::Height(h) => config.height = h,
            Self::Speed(s) => config.speed = s,
            Self::Fps(f) => config.fps = f,
            Self::Loop(l) => config.looping = l,
            Self::Debug(d) => config.debug = d,
            Self::StartTime(t) => config.start_time = t,
            Self::EndTime(t) => config.end_time = t,
        }
    }
}

/// Outcome of [`Player::reconfigure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconfigured {
    /// The new value is stored and takes effect on the next start.
    Applied,
    /// The active session was stopped and a fresh one started.
    Restarted,
}

fn validate_pixel_format(formats: &FormatTable, name: &str) -> Result<()> {
    if formats.contains(name) {
        Ok(())
    } else {
        Err(Error::validation(format!("unsupported pixel format: {name}")))
    }
}

// ---------------------------------------------------------------------------
// Shared controller state
// ---------------------------------------------------------------------------

struct Inner {
    config: PlaybackConfig,
    state: PlaybackState,
    session: Option<Session>,
    /// Bumped by every `stop()`; a `start()` that began probing under an
    /// older epoch abandons its spawn.
    epoch: u64,
}

impl Inner {
    fn owns(&self, id: SessionId) -> bool {
        self.session.as_ref().is_some_and(|s| s.id() == id)
    }

    fn release(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel();
        }
    }
}

pub(crate) struct Shared {
    inner: Mutex<Inner>,
    events: EventBus,
    backend: MediaBackend,
    source_path: PathBuf,
    /// Downloaded copy of a remote source, deleted with the player.
    _download: Option<TempPath>,
}

impl Shared {
    pub(crate) fn publish(&self, event: PlaybackEvent) {
        self.events.publish(event);
    }

    pub(crate) fn debug_enabled(&self) -> bool {
        self.inner.lock().config.debug
    }

    /// Current state, if `id` is still the active session.
    pub(crate) fn state_of(&self, id: SessionId) -> Option<PlaybackState> {
        let inner = self.inner.lock();
        inner.owns(id).then_some(inner.state)
    }

    /// `Collecting -> Running` for the session about to be paced.
    pub(crate) fn begin_pacing(&self, id: SessionId) -> bool {
        let mut inner = self.inner.lock();
        if inner.owns(id) && inner.state == PlaybackState::Collecting {
            inner.state = PlaybackState::Running;
            true
        } else {
            false
        }
    }

    /// Release a session that ran to completion and announce its end.
    ///
    /// Returns whether the configuration asks for a loop restart. Does
    /// nothing (and returns `false`) if `id` is no longer active.
    pub(crate) fn finish(&self, id: SessionId, code: Option<i32>) -> bool {
        let looping = {
            let mut inner = self.inner.lock();
            if !inner.owns(id) {
                return false;
            }
            inner.release();
            inner.state = PlaybackState::Ended;
            inner.config.looping
        };
        tracing::info!("Session {id} ended (exit code {code:?})");
        self.publish(PlaybackEvent::End(code));
        looping
    }

    /// Release a session whose decode process never launched.
    pub(crate) fn fail(&self, id: SessionId, message: String) {
        {
            let mut inner = self.inner.lock();
            if !inner.owns(id) {
                return;
            }
            inner.release();
            inner.state = PlaybackState::Ended;
        }
        tracing::warn!("Session {id} failed: {message}");
        self.publish(PlaybackEvent::Error(message));
    }

    /// Start a fresh session on a later task, unless the player has moved
    /// on by then.
    pub(crate) fn schedule_restart(self: &Arc<Self>) {
        let player = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            let Some(shared) = player.upgrade() else {
                return;
            };
            if let Err(e) = shared.start(StartMode::Restart).await {
                tracing::warn!("Loop restart failed: {e}");
                shared.publish(PlaybackEvent::Error(e.to_string()));
            }
        });
    }

    async fn start(self: &Arc<Self>, mode: StartMode) -> Result<()> {
        let (config, epoch) = {
            let inner = self.inner.lock();
            if inner.session.is_some() {
                tracing::debug!("start() ignored: a session is already active");
                return Ok(());
            }
            if mode == StartMode::Restart && inner.state != PlaybackState::Ended {
                tracing::debug!("Loop restart abandoned: player is {}", inner.state);
                return Ok(());
            }
            (inner.config.clone(), inner.epoch)
        };

        let metadata = self
            .backend
            .prober()
            .probe_source(&self.source_path)
            .await?;
        let geometry = geometry::resolve(&config, &metadata, self.backend.formats())?;

        let request = DecodeRequest {
            source: self.source_path.clone(),
            width: geometry.width,
            height: geometry.height,
            pixel_format: config.pixel_format.clone(),
            speed: config.speed,
            is_image: metadata.is_image,
            start_time: config.start_time,
            end_time: config.end_time,
        };

        if self.superseded(epoch) {
            tracing::debug!("start() superseded while probing");
            return Ok(());
        }

        // Launch outside the lock; a stop() racing the launch is caught
        // below and the fresh process is killed with its handle.
        let process = self.backend.decoder().spawn(&request);

        let task = {
            let mut inner = self.inner.lock();
            if inner.epoch != epoch || inner.session.is_some() {
                tracing::debug!("start() superseded while spawning");
                return Ok(());
            }
            if inner.config.width.is_none() && inner.config.height.is_none() {
                inner.config.width = Some(geometry.width);
                inner.config.height = Some(geometry.height);
            }

            let session = Session::new(geometry, metadata.is_image, process.pid());
            let task = SessionTask {
                id: session.id(),
                cancel: session.cancel_token(),
                process,
                geometry,
                is_image: metadata.is_image,
            };
            inner.session = Some(session);
            inner.state = PlaybackState::Collecting;
            task
        };

        tracing::info!(
            "Session {} started for {}: {geometry}",
            task.id,
            self.source_path.display()
        );
        tokio::spawn(scheduler::run(Arc::downgrade(self), task));
        Ok(())
    }

    /// Whether a `stop()` or another `start()` has happened since `epoch`.
    fn superseded(&self, epoch: u64) -> bool {
        let inner = self.inner.lock();
        inner.epoch != epoch || inner.session.is_some()
    }

    fn stop(&self) {
        let announce = {
            let mut inner = self.inner.lock();
            inner.release();
            inner.epoch += 1;
            let announce = inner.state != PlaybackState::Stopped;
            inner.state = PlaybackState::Stopped;
            announce
        };
        if announce {
            tracing::info!("Playback stopped");
            self.publish(PlaybackEvent::Stop);
        }
    }

    fn transition(&self, from: PlaybackState, to: PlaybackState, event: PlaybackEvent) {
        {
            let mut inner = self.inner.lock();
            if inner.state != from {
                tracing::trace!("{} ignored in state {}", event.kind(), inner.state);
                return;
            }
            inner.state = to;
        }
        self.publish(event);
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.inner.get_mut().release();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartMode {
    Host,
    Restart,
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// Real-time raw frame player for one source.
///
/// Cheap to clone; all clones control the same playback. Dropping the last
/// clone stops any active session.
#[derive(Clone)]
pub struct Player {
    shared: Arc<Shared>,
}

impl Player {
    /// Create a player for a local source.
    ///
    /// Every field of `config` is validated, including pixel format
    /// membership in the backend's capability table. Remote sources must go
    /// through [`Player::open`].
    pub fn new(config: PlaybackConfig, backend: MediaBackend) -> Result<Self> {
        Self::with_events(config, backend, &EventsConfig::default())
    }

    /// [`Player::new`] with explicit event channel settings.
    pub fn with_events(
        config: PlaybackConfig,
        backend: MediaBackend,
        events: &EventsConfig,
    ) -> Result<Self> {
        if config.is_remote() {
            return Err(Error::validation(format!(
                "remote source {} must be opened with Player::open",
                config.source
            )));
        }
        let source_path = absolute(Path::new(&config.source))?;
        Self::build(config, backend, events, source_path, None)
    }

    /// Create a player for a local path or an `http(s)://` URL.
    ///
    /// Remote sources are downloaded to a temporary file first; the file
    /// lives as long as the player.
    pub async fn open(config: PlaybackConfig, backend: MediaBackend) -> Result<Self> {
        Self::open_with_events(config, backend, &EventsConfig::default()).await
    }

    /// [`Player::open`] with explicit event channel settings.
    pub async fn open_with_events(
        config: PlaybackConfig,
        backend: MediaBackend,
        events: &EventsConfig,
    ) -> Result<Self> {
        if !config.is_remote() {
            return Self::with_events(config, backend, events);
        }
        config.validate()?;
        validate_pixel_format(backend.formats(), &config.pixel_format)?;

        let client = reqwest::Client::new();
        let download = acquire::download(&client, &config.source).await?;
        let source_path = download.to_path_buf();
        Self::build(config, backend, events, source_path, Some(download))
    }

    fn build(
        config: PlaybackConfig,
        backend: MediaBackend,
        events: &EventsConfig,
        source_path: PathBuf,
        download: Option<TempPath>,
    ) -> Result<Self> {
        config.validate()?;
        validate_pixel_format(backend.formats(), &config.pixel_format)?;

        tracing::debug!(
            "Player created for {} ({})",
            source_path.display(),
            config.pixel_format
        );
        Ok(Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    config,
                    state: PlaybackState::Idle,
                    session: None,
                    epoch: 0,
                }),
                events: EventBus::new(events.effective_capacity()),
                backend,
                source_path,
                _download: download,
            }),
        })
    }

    // ---- Transport ----

    /// Probe the source, spawn the decode process and begin playback.
    ///
    /// Returns as soon as the process is spawned. A no-op while a session
    /// is active. Probe and format errors are returned; anything that goes
    /// wrong afterwards arrives as an `error` event.
    pub async fn start(&self) -> Result<()> {
        self.shared.start(StartMode::Host).await
    }

    /// Suspend frame delivery. Only effective while running.
    pub fn pause(&self) {
        self.shared.transition(
            PlaybackState::Running,
            PlaybackState::Paused,
            PlaybackEvent::Pause,
        );
    }

    /// Continue frame delivery. Only effective while paused.
    pub fn resume(&self) {
        self.shared.transition(
            PlaybackState::Paused,
            PlaybackState::Running,
            PlaybackEvent::Resume,
        );
    }

    /// Kill the decode process, cancel pacing and announce `stop`.
    ///
    /// Idempotent: only the first call after playback announces anything.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Change one setting, restarting an active session when the setting
    /// affects the decode pipeline.
    ///
    /// An invalid value is rejected before anything changes.
    pub async fn reconfigure(&self, setting: Setting) -> Result<Reconfigured> {
        setting.validate(self.shared.backend.formats())?;
        tracing::debug!("Reconfiguring {}: {setting:?}", setting.name());

        if !setting.requires_restart() {
            setting.apply(&mut self.shared.inner.lock().config);
            return Ok(Reconfigured::Applied);
        }

        let active = self.shared.inner.lock().session.is_some();
        if active {
            self.stop();
        }
        setting.apply(&mut self.shared.inner.lock().config);
        if !active {
            return Ok(Reconfigured::Applied);
        }
        self.start().await?;
        Ok(Reconfigured::Restarted)
    }

    /// Shorthand for `reconfigure(Setting::Speed(speed))`.
    pub async fn set_speed(&self, speed: f64) -> Result<Reconfigured> {
        self.reconfigure(Setting::Speed(speed)).await
    }

    // ---- Inspection ----

    pub fn state(&self) -> PlaybackState {
        self.shared.inner.lock().state
    }

    /// Snapshot of the active session, if any.
    pub fn session(&self) -> Option<SessionInfo> {
        self.shared.inner.lock().session.as_ref().map(Session::info)
    }

    /// Copy of the current configuration. Auto-sized dimensions become
    /// concrete after the first start.
    pub fn config(&self) -> PlaybackConfig {
        self.shared.inner.lock().config.clone()
    }

    /// Absolute path the decode process reads from.
    pub fn source_path(&self) -> &Path {
        &self.shared.source_path
    }

    /// Pixel formats the backend can produce.
    pub fn formats(&self) -> &FormatTable {
        self.shared.backend.formats()
    }

    // ---- Subscription ----

    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&PlaybackEvent) + Send + Sync + 'static,
    {
        self.shared.events.on(kind, listener)
    }

    pub fn once<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&PlaybackEvent) + Send + Sync + 'static,
    {
        self.shared.events.once(kind, listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.shared.events.off(id)
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.shared.events.subscribe()
    }
}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("Player")
            .field("source", &self.shared.source_path)
            .field("state", &inner.state)
            .field("session", &inner.session.as_ref().map(Session::id))
            .finish()
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
