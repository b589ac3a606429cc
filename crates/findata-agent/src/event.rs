//! Lifecycle events emitted during one orchestration run
//!
//! The engine is parameterized by an event sink; streaming consumers drain a
//! channel, the non-streaming path collects into a vector and keeps only the
//! terminal value. The final event in any run is always exactly one
//! [`LifecycleEvent::Result`].

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;

/// One unit of the orchestration's observable output stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Complete reasoning snapshot for one attempt
    Thought(String),

    /// Incremental token of an in-flight reasoning snapshot
    ThoughtChunk(String),

    /// Code about to be executed
    Execution(String),

    /// Diagnostic text of a failed attempt
    Error(String),

    /// Terminal event; exactly one per run
    Result {
        /// Whether the run succeeded
        success: bool,
        /// Artifact path or free text
        payload: String,
    },
}

impl LifecycleEvent {
    /// Whether this is the terminal event of a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Result { .. })
    }
}

/// Sink receiving lifecycle events in emission order
pub trait EventSink: Send + Sync {
    /// Deliver one event; must not block the orchestration loop
    fn emit(&self, event: LifecycleEvent);
}

/// Sink that appends events to an in-memory vector
///
/// Used by the non-streaming path and by tests to assert on event order.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl CollectingSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: LifecycleEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Sink that forwards events over an unbounded channel
///
/// A closed receiver is not an error: the run keeps going and the remaining
/// events are dropped, since the terminal outcome is also returned directly.
pub struct ChannelSink {
    tx: UnboundedSender<LifecycleEvent>,
}

impl ChannelSink {
    /// Wrap an unbounded sender
    pub fn new(tx: UnboundedSender<LifecycleEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: LifecycleEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink_preserves_order() {
        let sink = CollectingSink::new();
        sink.emit(LifecycleEvent::Thought("plan".to_string()));
        sink.emit(LifecycleEvent::Execution("code".to_string()));
        sink.emit(LifecycleEvent::Result {
            success: true,
            payload: "done".to_string(),
        });

        let events = sink.events();
        assert_eq!(events.len(), 3);
        assert!(events[2].is_terminal());
        assert!(!events[0].is_terminal());
    }

    #[test]
    fn test_channel_sink_forwards() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);
        sink.emit(LifecycleEvent::Error("boom".to_string()));

        assert_eq!(
            rx.try_recv().unwrap(),
            LifecycleEvent::Error("boom".to_string())
        );
    }

    #[test]
    fn test_channel_sink_tolerates_closed_receiver() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        let sink = ChannelSink::new(tx);
        // Must not panic
        sink.emit(LifecycleEvent::ThoughtChunk("x".to_string()));
    }

    #[test]
    fn test_event_serialization_tag() {
        let event = LifecycleEvent::Result {
            success: false,
            payload: "failed".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"result\""));
    }
}
