use std::sync::{Arc, Mutex};
use crate::events::base::OracleEvent;

pub trait EventSink: Send {
    fn publish(&mut self, event: OracleEvent);
}

/// Writes each event as a JSON log line.
#[derive(Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn publish(&mut self, event: OracleEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => tracing::info!(
                target: "oracle_events",
                sequence = event.sequence,
                event_type = ?event.event_type,
                "{}",
                json
            ),
            Err(e) => tracing::error!("Failed to serialize event {}: {}", event.event_id, e),
        }
    }
}

/// Keeps published events in memory; clones share the same buffer.
#[derive(Clone, Default)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<OracleEvent>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<OracleEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for RecordingEventSink {
    fn publish(&mut self, event: OracleEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
