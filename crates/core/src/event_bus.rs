//! Lifecycle events of the trigger engine.
//!
//! Every report, suppression and failure is also published as a
//! [`JourneyEvent`] on the sink handed to the engine. Hosts forward these to
//! their own analytics; tests record them with [`CaptureSink`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JourneyEventKind {
    StepReported,
    StepSuppressed,
    ReportFailed,
    PersistFailed,
    TriggerRejected,
    DigressionDetected,
}

/// One engine occurrence, scoped to a conversation. `step_id` is absent for
/// page-level events such as a digression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JourneyEvent {
    pub event_id: Uuid,
    pub kind: JourneyEventKind,
    pub conversation_id: String,
    pub step_id: Option<String>,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl JourneyEvent {
    pub fn new(
        kind: JourneyEventKind,
        conversation_id: impl Into<String>,
        step_id: Option<String>,
        detail: Option<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind,
            conversation_id: conversation_id.into(),
            step_id,
            detail,
            timestamp: Utc::now(),
        }
    }
}

/// Receives engine events. Called synchronously from the engine, so
/// implementations must not block.
pub trait JourneyEventSink: Send + Sync {
    fn emit(&self, event: JourneyEvent);
}

/// Discards everything.
pub struct NoOpSink;

impl JourneyEventSink for NoOpSink {
    fn emit(&self, _event: JourneyEvent) {}
}

/// Keeps every event in arrival order.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<JourneyEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<JourneyEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn count_kind(&self, kind: JourneyEventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }

    /// Step ids carried by events of `kind`, in arrival order.
    pub fn steps_of(&self, kind: JourneyEventKind) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind == kind)
            .filter_map(|e| e.step_id.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl JourneyEventSink for CaptureSink {
    fn emit(&self, event: JourneyEvent) {
        self.events.lock().push(event);
    }
}

/// Shorthand for [`JourneyEvent::new`].
pub fn make_event(
    kind: JourneyEventKind,
    conversation_id: impl Into<String>,
    step_id: Option<String>,
    detail: Option<String>,
) -> JourneyEvent {
    JourneyEvent::new(kind, conversation_id, step_id, detail)
}

pub fn noop_sink() -> Arc<dyn JourneyEventSink> {
    Arc::new(NoOpSink)
}

pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}
