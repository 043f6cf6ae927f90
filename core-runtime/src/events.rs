//! # Event Bus
//!
//! Broadcast channel carrying session and sync notifications to whoever is
//! listening (a UI, a log forwarder, a test).
//!
//! ```text
//! ┌──────────────┐   emit    ┌──────────┐  subscribe  ┌────────────┐
//! │ SessionMgr   ├──────────>│          ├────────────>│ Subscriber │
//! └──────────────┘           │ EventBus │             └────────────┘
//! ┌──────────────┐   emit    │          │  subscribe  ┌────────────┐
//! │ Coordinator  ├──────────>│          ├────────────>│ Subscriber │
//! └──────────────┘           └──────────┘             └────────────┘
//! ```
//!
//! Emitting with no subscribers returns an error that producers discard with
//! `.ok()`. A sync pass never depends on anybody listening.
//!
//! ```rust
//! use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
//!
//! let bus = EventBus::new(32);
//! bus.emit(CoreEvent::Auth(AuthEvent::SignedOut)).ok();
//! ```
//!
//! Slow subscribers get `RecvError::Lagged(n)` and keep receiving; `Closed`
//! means every sender is gone.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Auth(AuthEvent),
    Sync(SyncEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::AuthError { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Auth(AuthEvent::SessionInvalidated { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::Completed { failed, .. }) if *failed > 0 => {
                EventSeverity::Warning
            }
            CoreEvent::Auth(AuthEvent::SignedIn { .. }) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Authentication Events
// ============================================================================

/// Session lifecycle against the tracker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// Logged in and resolved the configured project.
    SignedIn {
        /// Email of the logged in user.
        user: String,
        project: String,
    },
    SignedOut,
    /// Sessions opened before this point must be reopened.
    SessionInvalidated { reason: String },
    AuthError { message: String },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::SignedIn { .. } => "Signed in to tracker",
            AuthEvent::SignedOut => "Signed out from tracker",
            AuthEvent::SessionInvalidated { .. } => "Tracker session invalidated",
            AuthEvent::AuthError { .. } => "Tracker authentication error",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Progress of a single synchronization pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    Started {
        job_id: String,
        /// `"shots"` or `"assets"`.
        kind: String,
        /// `"push"` (local to tracker) or `"pull"` (tracker to local).
        direction: String,
    },
    Progress {
        job_id: String,
        items_processed: u64,
        total_items: Option<u64>,
        /// 0-100.
        percent: u8,
        phase: String,
    },
    Completed {
        job_id: String,
        created: u64,
        updated: u64,
        failed: u64,
        duration_secs: u64,
    },
    /// The pass stopped before visiting every entity.
    Failed { job_id: String, message: String },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::Progress { .. } => "Sync in progress",
            SyncEvent::Completed { .. } => "Sync completed",
            SyncEvent::Failed { .. } => "Sync failed",
        }
    }

    /// Percentage of `total` reached after `processed` items, clamped to 100.
    pub fn percent_of(processed: u64, total: u64) -> u8 {
        if total == 0 {
            return 100;
        }
        ((processed.min(total) * 100) / total) as u8
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Cloneable handle to the broadcast channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Returns the number of subscribers that received the event, or an
    /// error when nobody is subscribed.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// New receiver for future events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A receiver with an optional predicate applied to every event.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv`/`try_recv`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Waits for the next matching event.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Returns `None` when no matching event is queued.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(failed: u64) -> CoreEvent {
        CoreEvent::Sync(SyncEvent::Completed {
            job_id: "job-1".to_string(),
            created: 2,
            updated: 1,
            failed,
            duration_secs: 3,
        })
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_fails() {
        let bus = EventBus::new(10);
        assert!(bus.emit(CoreEvent::Auth(AuthEvent::SignedOut)).is_err());
    }

    #[tokio::test]
    async fn test_all_subscribers_receive_event() {
        let bus = EventBus::new(10);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let event = CoreEvent::Sync(SyncEvent::Started {
            job_id: "job-1".to_string(),
            kind: "shots".to_string(),
            direction: "push".to_string(),
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(first.recv().await.unwrap(), event);
        assert_eq!(second.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_filtered_stream_skips_other_events() {
        let bus = EventBus::new(10);
        let mut stream =
            EventStream::new(bus.subscribe()).filter(|event| matches!(event, CoreEvent::Auth(_)));

        bus.emit(completed(0)).ok();
        let auth = CoreEvent::Auth(AuthEvent::SignedIn {
            user: "ana@studio.test".to_string(),
            project: "Ghibli".to_string(),
        });
        bus.emit(auth.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), auth);
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();
        for i in 0..5 {
            bus.emit(CoreEvent::Sync(SyncEvent::Progress {
                job_id: "job-1".to_string(),
                items_processed: i,
                total_items: Some(5),
                percent: SyncEvent::percent_of(i, 5),
                phase: "shots".to_string(),
            }))
            .ok();
        }
        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_severity() {
        let error = CoreEvent::Auth(AuthEvent::AuthError {
            message: "bad password".to_string(),
        });
        assert_eq!(error.severity(), EventSeverity::Error);
        assert_eq!(completed(0).severity(), EventSeverity::Info);
        assert_eq!(completed(1).severity(), EventSeverity::Warning);
        assert_eq!(
            CoreEvent::Auth(AuthEvent::SignedOut).severity(),
            EventSeverity::Debug
        );
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(SyncEvent::percent_of(0, 4), 0);
        assert_eq!(SyncEvent::percent_of(1, 4), 25);
        assert_eq!(SyncEvent::percent_of(9, 4), 100);
        assert_eq!(SyncEvent::percent_of(0, 0), 100);
    }

    #[test]
    fn test_serialized_shape() {
        let event = CoreEvent::Auth(AuthEvent::SessionInvalidated {
            reason: "credentials changed".to_string(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Auth");
        assert_eq!(json["payload"]["event"], "SessionInvalidated");

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
