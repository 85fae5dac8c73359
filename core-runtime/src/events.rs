//! # Decoder Events
//!
//! Lifecycle notifications for decoding sessions, broadcast over
//! `tokio::sync::broadcast`.
//!
//! The worker publishes `Started`, `Ready`, seek outcomes and exactly one
//! terminal event per session; hosts subscribe instead of polling the
//! Command Channel. Publishing is a non-blocking send, so the worker thread
//! never waits on a slow subscriber, and nobody listening is fine.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{DecoderEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(64);
//! let mut stream = bus.stream().for_session("session-1");
//!
//! bus.emit_decoder(DecoderEvent::Finished {
//!     session_id: "session-1".to_string(),
//! });
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Decoder finished");
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError, Receiver};

/// Default number of events buffered per subscriber.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 128;

// ============================================================================
// Event Types
// ============================================================================

/// Top-level event enum published through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Decoder session lifecycle events
    Decoder(DecoderEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Decoder(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Decoder(DecoderEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Decoder(DecoderEvent::SeekFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Decoder(DecoderEvent::Ready { .. })
            | CoreEvent::Decoder(DecoderEvent::Finished { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// Session the event belongs to.
    pub fn session_id(&self) -> &str {
        match self {
            CoreEvent::Decoder(e) => e.session_id(),
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

/// Events describing one decoding session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum DecoderEvent {
    /// A worker was spawned for a new input stream.
    Started {
        session_id: String,
        /// Input URI, if the host supplied one.
        uri: Option<String>,
    },
    /// The plugin announced the audio format.
    Ready {
        session_id: String,
        sample_rate: u32,
        channels: u8,
        seekable: bool,
        /// Total duration in milliseconds; `None` when unknown.
        duration_ms: Option<u64>,
    },
    /// A seek was acknowledged successfully.
    SeekCompleted {
        session_id: String,
        position_ms: u64,
    },
    /// A seek was acknowledged but could not be satisfied.
    SeekFailed { session_id: String },
    /// The plugin returned after reaching the end of the stream.
    Finished { session_id: String },
    /// The plugin unwound after a stop command.
    Stopped { session_id: String },
    /// The session ended with an error.
    Failed {
        session_id: String,
        message: String,
        /// The plugin broke the submission protocol (not a runtime failure).
        protocol_violation: bool,
    },
}

impl DecoderEvent {
    fn description(&self) -> &str {
        match self {
            DecoderEvent::Started { .. } => "Decoder started",
            DecoderEvent::Ready { .. } => "Decoder ready",
            DecoderEvent::SeekCompleted { .. } => "Seek completed",
            DecoderEvent::SeekFailed { .. } => "Seek failed",
            DecoderEvent::Finished { .. } => "Decoder finished",
            DecoderEvent::Stopped { .. } => "Decoder stopped",
            DecoderEvent::Failed { .. } => "Decoder failed",
        }
    }

    fn session_id(&self) -> &str {
        match self {
            DecoderEvent::Started { session_id, .. }
            | DecoderEvent::Ready { session_id, .. }
            | DecoderEvent::SeekCompleted { session_id, .. }
            | DecoderEvent::SeekFailed { session_id }
            | DecoderEvent::Finished { session_id }
            | DecoderEvent::Stopped { session_id }
            | DecoderEvent::Failed { session_id, .. } => session_id,
        }
    }

    /// Returns `true` for events that end a session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DecoderEvent::Finished { .. } | DecoderEvent::Stopped { .. } | DecoderEvent::Failed { .. }
        )
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Cloneable broadcast handle shared by every decoder session of a host.
///
/// Sending is a non-blocking `tokio::sync::broadcast` send, so worker
/// threads publish without a runtime. Subscribers that fall more than
/// `capacity` events behind see `RecvError::Lagged`.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish `event`; returns how many subscribers got it.
    ///
    /// An event nobody listens to is dropped, which is not an error.
    pub fn emit(&self, event: CoreEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn emit_decoder(&self, event: DecoderEvent) -> usize {
        self.emit(CoreEvent::Decoder(event))
    }

    /// New receiver; it sees events published from now on.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// New unfiltered [`EventStream`].
    pub fn stream(&self) -> EventStream {
        EventStream::new(self.subscribe())
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
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A receiver with an optional predicate.
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

    /// Keep only events matching `predicate`. Replaces an earlier filter.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Keep only events of one session.
    pub fn for_session(self, session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        self.filter(move |event| event.session_id() == session_id)
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Next matching event.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if `n` events were missed, `RecvError::Closed`
    /// once every bus handle is gone.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Wait for the event that ends a session.
    pub async fn recv_terminal(&mut self) -> Result<DecoderEvent, RecvError> {
        loop {
            let CoreEvent::Decoder(event) = self.recv().await?;
            if event.is_terminal() {
                return Ok(event);
            }
        }
    }

    /// Next matching event that is already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            let event = match self.receiver.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Lagged(n)) => return Some(Err(RecvError::Lagged(n))),
                Err(TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            };
            if self.accepts(&event) {
                return Some(Ok(event));
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(session: &str) -> DecoderEvent {
        DecoderEvent::Ready {
            session_id: session.to_string(),
            sample_rate: 44100,
            channels: 2,
            seekable: true,
            duration_ms: Some(180_000),
        }
    }

    fn finished(session: &str) -> DecoderEvent {
        DecoderEvent::Finished {
            session_id: session.to_string(),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_dropped() {
        let bus = EventBus::new(8);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.emit_decoder(finished("s1")), 0);
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_the_event() {
        let bus = EventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.stream();

        assert_eq!(bus.emit_decoder(ready("s1")), 2);
        assert_eq!(first.recv().await.unwrap(), CoreEvent::Decoder(ready("s1")));
        assert_eq!(second.recv().await.unwrap(), CoreEvent::Decoder(ready("s1")));
    }

    #[tokio::test]
    async fn test_session_filter() {
        let bus = EventBus::new(8);
        let mut stream = bus.stream().for_session("wanted");

        bus.emit_decoder(finished("other"));
        bus.emit_decoder(finished("wanted"));

        assert_eq!(stream.recv().await.unwrap().session_id(), "wanted");
    }

    #[tokio::test]
    async fn test_recv_terminal_skips_progress_events() {
        let bus = EventBus::new(8);
        let mut stream = bus.stream();

        bus.emit_decoder(DecoderEvent::Started {
            session_id: "s1".to_string(),
            uri: None,
        });
        bus.emit_decoder(ready("s1"));
        bus.emit_decoder(DecoderEvent::Stopped {
            session_id: "s1".to_string(),
        });

        assert!(matches!(
            stream.recv_terminal().await.unwrap(),
            DecoderEvent::Stopped { .. }
        ));
    }

    #[test]
    fn test_try_recv_with_severity_filter() {
        let bus = EventBus::new(8);
        let mut stream = bus
            .stream()
            .filter(|event| event.severity() >= EventSeverity::Warning);

        bus.emit_decoder(finished("s1"));
        bus.emit_decoder(DecoderEvent::SeekFailed {
            session_id: "s1".to_string(),
        });

        let received = stream.try_recv().unwrap().unwrap();
        assert_eq!(received.description(), "Seek failed");
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit_decoder(finished(&format!("s{i}")));
        }
        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_classification() {
        let violation = DecoderEvent::Failed {
            session_id: "s1".to_string(),
            message: "submit_data called before ready()".to_string(),
            protocol_violation: true,
        };
        assert!(violation.is_terminal());
        assert_eq!(CoreEvent::Decoder(violation).severity(), EventSeverity::Error);

        let seek = CoreEvent::Decoder(DecoderEvent::SeekCompleted {
            session_id: "s1".to_string(),
            position_ms: 1_000,
        });
        assert_eq!(seek.severity(), EventSeverity::Debug);
        assert_eq!(seek.session_id(), "s1");
    }

    #[test]
    fn test_serialized_shape() {
        let event = CoreEvent::Decoder(DecoderEvent::SeekCompleted {
            session_id: "s1".to_string(),
            position_ms: 60_000,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Decoder\""));
        assert!(json.contains("\"event\":\"SeekCompleted\""));
        assert_eq!(serde_json::from_str::<CoreEvent>(&json).unwrap(), event);
    }
}
