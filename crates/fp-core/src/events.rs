//! Playback event system.
//!
//! [`EventBus`] fans each [`PlaybackEvent`] out to two kinds of subscriber:
//! callback listeners registered per [`EventKind`] (persistent or one-shot),
//! and `tokio::sync::broadcast` receivers that see every event.
//!
//! Listeners run synchronously inside [`EventBus::publish`], in registration
//! order and after the event has been queued for receivers. No internal lock
//! is held, so a listener may register or remove listeners or call back into
//! the player that owns the bus.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::DEFAULT_CHANNEL_CAPACITY;
use crate::media::Frame;

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

/// Notification names exposed to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Frame,
    End,
    Error,
    Pause,
    Resume,
    Stop,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Frame,
        EventKind::End,
        EventKind::Error,
        EventKind::Pause,
        EventKind::Resume,
        EventKind::Stop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Frame => "frame",
            Self::End => "end",
            Self::Error => "error",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| crate::Error::validation(format!("unknown event name: {s}")))
    }
}

// ---------------------------------------------------------------------------
// PlaybackEvent
// ---------------------------------------------------------------------------

/// Something the player announces to its host.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// The next paced frame.
    Frame(Frame),
    /// The session ran to completion; carries the decode process exit code.
    End(Option<i32>),
    /// A failure observed after `start()` returned.
    Error(String),
    Pause,
    Resume,
    Stop,
}

impl PlaybackEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Frame(_) => EventKind::Frame,
            Self::End(_) => EventKind::End,
            Self::Error(_) => EventKind::Error,
            Self::Pause => EventKind::Pause,
            Self::Resume => EventKind::Resume,
            Self::Stop => EventKind::Stop,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Handle returned by [`EventBus::on`] / [`EventBus::once`], used to remove
/// the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&PlaybackEvent) + Send + Sync>;

struct Registration {
    id: ListenerId,
    kind: EventKind,
    once: bool,
    callback: Listener,
}

/// Listener registry plus broadcast channel for playback events.
pub struct EventBus {
    tx: broadcast::Sender<PlaybackEvent>,
    listeners: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create a new event bus whose broadcast receivers buffer up to
    /// `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Subscribe to every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.tx.subscribe()
    }

    /// Register a persistent listener for one kind of event.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&PlaybackEvent) + Send + Sync + 'static,
    {
        self.register(kind, false, Arc::new(listener))
    }

    /// Register a listener that is removed after its first invocation.
    pub fn once<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&PlaybackEvent) + Send + Sync + 'static,
    {
        self.register(kind, true, Arc::new(listener))
    }

    /// Remove a listener. Returns `false` if it was already gone.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|r| r.id != id);
        listeners.len() != before
    }

    /// Number of callback listeners currently registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.lock().iter().filter(|r| r.kind == kind).count()
    }

    /// Deliver an event to broadcast receivers, then to the matching
    /// listeners.
    ///
    /// Receivers see events in causal order: anything a listener publishes
    /// while handling `event` is queued after it.
    pub fn publish(&self, event: PlaybackEvent) {
        let kind = event.kind();
        let callbacks: Vec<Listener> = {
            let mut listeners = self.listeners.lock();
            let mut matched = Vec::new();
            listeners.retain(|r| {
                if r.kind == kind {
                    matched.push(Arc::clone(&r.callback));
                    !r.once
                } else {
                    true
                }
            });
            matched
        };

        if callbacks.is_empty() {
            // Ignore send errors (no subscribers).
            let _ = self.tx.send(event);
            return;
        }

        let _ = self.tx.send(event.clone());
        for callback in callbacks {
            callback(&event);
        }
    }

    fn register(&self, kind: EventKind, once: bool, callback: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push(Registration {
            id,
            kind,
            once,
            callback,
        });
        id
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.lock().len())
            .field("receivers", &self.tx.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&PlaybackEvent) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, move |_: &PlaybackEvent| {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn broadcast_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(PlaybackEvent::End(Some(0)));

        let event = rx.try_recv().unwrap();
        assert_eq!(event, PlaybackEvent::End(Some(0)));
    }

    #[test]
    fn listeners_only_see_their_kind() {
        let bus = EventBus::default();
        let (pauses, on_pause) = counter();
        bus.on(EventKind::Pause, on_pause);

        bus.publish(PlaybackEvent::Pause);
        bus.publish(PlaybackEvent::Resume);
        bus.publish(PlaybackEvent::Pause);

        assert_eq!(pauses.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn once_listener_fires_once() {
        let bus = EventBus::default();
        let (stops, on_stop) = counter();
        bus.once(EventKind::Stop, on_stop);
        assert_eq!(bus.listener_count(EventKind::Stop), 1);

        bus.publish(PlaybackEvent::Stop);
        bus.publish(PlaybackEvent::Stop);

        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(EventKind::Stop), 0);
    }

    #[test]
    fn off_removes_listener() {
        let bus = EventBus::default();
        let (ends, on_end) = counter();
        let id = bus.on(EventKind::End, on_end);

        assert!(bus.off(id));
        assert!(!bus.off(id));
        bus.publish(PlaybackEvent::End(None));
        assert_eq!(ends.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listener_may_reenter_bus() {
        let bus = Arc::new(EventBus::default());
        let (resumes, on_resume) = counter();
        let inner = Arc::clone(&bus);
        bus.once(EventKind::Pause, move |_| {
            inner.publish(PlaybackEvent::Resume);
        });
        bus.on(EventKind::Resume, on_resume);

        bus.publish(PlaybackEvent::Pause);
        assert_eq!(resumes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn receivers_see_listener_reactions_after_the_cause() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let inner = Arc::clone(&bus);
        bus.once(EventKind::End, move |_| inner.publish(PlaybackEvent::Stop));

        bus.publish(PlaybackEvent::End(Some(0)));

        assert_eq!(rx.try_recv().unwrap(), PlaybackEvent::End(Some(0)));
        assert_eq!(rx.try_recv().unwrap(), PlaybackEvent::Stop);
    }

    #[test]
    fn frame_payload_is_delivered() {
        let bus = EventBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.on(EventKind::Frame, move |event| {
            if let PlaybackEvent::Frame(frame) = event {
                sink.lock().push(frame.sequence());
            }
        });

        for seq in 0..3 {
            bus.publish(PlaybackEvent::Frame(Frame::new(seq, Bytes::from_static(b"ab"))));
        }
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn event_kind_names() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert!("frames".parse::<EventKind>().is_err());
        assert_eq!(PlaybackEvent::Error("x".into()).kind(), EventKind::Error);
    }

    #[test]
    fn no_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.publish(PlaybackEvent::Error("test".into()));
    }
}
