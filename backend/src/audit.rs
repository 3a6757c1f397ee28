//! Audit events for archive, restore, delete and taxonomy mutations
//!
//! The engine only produces events; storing them belongs to the audit log
//! behind the sink.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AuditEvent {
    pub actor_id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(actor_id: Uuid, action: &str, entity_type: &str, entity_id: impl ToString) -> Self {
        Self {
            actor_id,
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            before: None,
            after: None,
            reason: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn before<T: Serialize>(mut self, value: &T) -> Self {
        self.before = serde_json::to_value(value).ok();
        self
    }

    pub fn after<T: Serialize>(mut self, value: &T) -> Self {
        self.after = serde_json::to_value(value).ok();
        self
    }

    pub fn reason(mut self, reason: Option<&str>) -> Self {
        self.reason = reason.map(str::to_string);
        self
    }
}

/// Destination for audit events
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Emits each event as a structured `tracing` event on the `audit` target
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        let before = event.before.as_ref().map(Value::to_string).unwrap_or_default();
        let after = event.after.as_ref().map(Value::to_string).unwrap_or_default();
        tracing::info!(
            target: "audit",
            actor_id = %event.actor_id,
            action = %event.action,
            entity_type = %event.entity_type,
            entity_id = %event.entity_id,
            reason = event.reason.as_deref().unwrap_or(""),
            before = %before,
            after = %after,
            occurred_at = %event.occurred_at,
            "audit event"
        );
    }
}

/// Keeps events in memory; used by tests
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn actions(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.action).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
