//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! The ledger publishes [`LedgerEvent`]s here; the `/events` endpoint
//! streams them to connected desks as Server-Sent Events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::asset::AssetClass;

/// Event name published after a successful checkout or checkin
pub const ACTIVE_LOANS_CHANGED: &str = "active_loans.changed";

/// Event name published after an active loans listing
pub const ACTIVE_LOANS_SNAPSHOT: &str = "active_loans.snapshot";

/// Default buffer capacity for the broadcast channel
const DEFAULT_CAPACITY: usize = 1024;

/// A ledger change worth telling connected clients about.
///
/// Carries counts and keys only, never borrower details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub id: Uuid,
    /// Dot-separated event name, e.g. `"active_loans.changed"`
    pub event_type: String,
    pub class: AssetClass,
    /// Free-form JSON payload carrying event-specific data
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl LedgerEvent {
    pub fn new(event_type: impl Into<String>, class: AssetClass) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            class,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// `operation` is `checkout` or `checkin`
    pub fn changed(class: AssetClass, operation: &str) -> Self {
        Self::new(ACTIVE_LOANS_CHANGED, class)
            .with_payload(serde_json::json!({ "operation": operation }))
    }

    pub fn snapshot(class: AssetClass, active: usize, anomalies: usize) -> Self {
        Self::new(ACTIVE_LOANS_SNAPSHOT, class).with_payload(serde_json::json!({
            "active": active,
            "anomalies": anomalies,
        }))
    }
}

/// In-process fan-out event bus, shared as `Arc<EventBus>`
pub struct EventBus {
    sender: broadcast::Sender<LedgerEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// Slow receivers observe `RecvError::Lagged` once the buffer is full.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers
    pub fn publish(&self, event: LedgerEvent) {
        // A SendError only means there are no subscribers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
