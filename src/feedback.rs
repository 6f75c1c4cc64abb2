// Feedback channel
// Transient user-visible status messages that expire on their own.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use uuid::Uuid;

pub const DEFAULT_TTL: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackKind {
    Success,
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedbackId(Uuid);

impl std::fmt::Display for FeedbackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// What callers hand to `enqueue`
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackMessage {
    pub kind: FeedbackKind,
    pub title: String,
    pub body: Option<String>,
    pub ttl: Option<Duration>,
}

impl FeedbackMessage {
    pub fn new(kind: FeedbackKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            body: None,
            ttl: None,
        }
    }

    pub fn success(title: impl Into<String>) -> Self {
        Self::new(FeedbackKind::Success, title)
    }

    pub fn error(title: impl Into<String>) -> Self {
        Self::new(FeedbackKind::Error, title)
    }

    pub fn warning(title: impl Into<String>) -> Self {
        Self::new(FeedbackKind::Warning, title)
    }

    pub fn info(title: impl Into<String>) -> Self {
        Self::new(FeedbackKind::Info, title)
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

// A message as it sits in the queue
#[derive(Debug, Clone, PartialEq)]
pub struct Feedback {
    pub id: FeedbackId,
    pub kind: FeedbackKind,
    pub title: String,
    pub body: Option<String>,
    pub ttl: Duration,
    pub created_at: Instant,
}

impl Feedback {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    Dismissed,
    Expired,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackEvent {
    Added(Feedback),
    Removed { id: FeedbackId, reason: RemovalReason },
    Cleared,
}

struct Inner {
    // FIFO: oldest at the head
    entries: Mutex<Vec<Feedback>>,
    default_ttl: Duration,
    events: broadcast::Sender<FeedbackEvent>,
}

/// Session-scoped queue of feedback messages.
///
/// Cloning yields another handle onto the same queue. Each enqueued message
/// gets a timer on the current tokio runtime; reads also drop anything past
/// its time-to-live, so expiry holds even without a runtime.
#[derive(Clone)]
pub struct FeedbackChannel {
    inner: Arc<Inner>,
}

impl Default for FeedbackChannel {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl FeedbackChannel {
    pub fn new(default_ttl: Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(Vec::new()),
                default_ttl,
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedbackEvent> {
        self.inner.events.subscribe()
    }

    pub fn enqueue(&self, message: FeedbackMessage) -> FeedbackId {
        let feedback = Feedback {
            id: FeedbackId(Uuid::new_v4()),
            kind: message.kind,
            title: message.title,
            body: message.body,
            ttl: message.ttl.unwrap_or(self.inner.default_ttl),
            created_at: Instant::now(),
        };
        let id = feedback.id;
        let ttl = feedback.ttl;

        match feedback.kind {
            FeedbackKind::Error => tracing::warn!(%id, title = %feedback.title, "error feedback"),
            _ => tracing::debug!(%id, title = %feedback.title, "feedback"),
        }

        self.inner.entries.lock().push(feedback.clone());
        let _ = self.inner.events.send(FeedbackEvent::Added(feedback));

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let weak: Weak<Inner> = Arc::downgrade(&self.inner);
            handle.spawn(async move {
                tokio::time::sleep(ttl).await;
                if let Some(inner) = weak.upgrade() {
                    FeedbackChannel { inner }.remove(id, RemovalReason::Expired);
                }
            });
        }

        id
    }

    pub fn success(&self, title: impl Into<String>) -> FeedbackId {
        self.enqueue(FeedbackMessage::success(title))
    }

    pub fn error(&self, title: impl Into<String>, body: impl Into<String>) -> FeedbackId {
        self.enqueue(FeedbackMessage::error(title).with_body(body))
    }

    pub fn warning(&self, title: impl Into<String>) -> FeedbackId {
        self.enqueue(FeedbackMessage::warning(title))
    }

    pub fn info(&self, title: impl Into<String>) -> FeedbackId {
        self.enqueue(FeedbackMessage::info(title))
    }

    // No-op for ids that already expired or were dismissed
    pub fn dismiss(&self, id: FeedbackId) -> bool {
        self.remove(id, RemovalReason::Dismissed)
    }

    fn remove(&self, id: FeedbackId, reason: RemovalReason) -> bool {
        let removed = {
            let mut entries = self.inner.entries.lock();
            let before = entries.len();
            entries.retain(|f| f.id != id);
            entries.len() != before
        };
        if removed {
            let _ = self.inner.events.send(FeedbackEvent::Removed { id, reason });
        }
        removed
    }

    // Drops everything past its TTL; returns how many went
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<FeedbackId> = {
            let mut entries = self.inner.entries.lock();
            let expired = entries
                .iter()
                .filter(|f| f.is_expired(now))
                .map(|f| f.id)
                .collect();
            entries.retain(|f| !f.is_expired(now));
            expired
        };
        for id in &expired {
            let _ = self.inner.events.send(FeedbackEvent::Removed {
                id: *id,
                reason: RemovalReason::Expired,
            });
        }
        expired.len()
    }

    // Queue order, oldest first
    pub fn visible(&self) -> Vec<Feedback> {
        self.prune_expired();
        self.inner.entries.lock().clone()
    }

    // Render order: newest at the top of the screen
    pub fn visible_newest_first(&self) -> Vec<Feedback> {
        let mut entries = self.visible();
        entries.reverse();
        entries
    }

    pub fn len(&self) -> usize {
        self.visible().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.entries.lock().clear();
        let _ = self.inner.events.send(FeedbackEvent::Cleared);
    }
}

impl std::fmt::Debug for FeedbackChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackChannel")
            .field("pending", &self.inner.entries.lock().len())
            .field("default_ttl", &self.inner.default_ttl)
            .finish()
    }
}
