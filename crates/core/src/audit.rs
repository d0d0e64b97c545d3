//! Audit events.
//!
//! The engine creates an [`AuditEvent`] at each decision point and hands it to an
//! [`AuditEmitter`]. Delivery and storage are the emitter's business; a failed emit is reported
//! back as a warning on the diagnosis, never as an error.

use crate::error::{PersistenceError, PersistenceResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Mutex;
use uuid::Uuid;

/// A single audited decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub detail: Map<String, Value>,
}

impl AuditEvent {
    pub fn new(kind: impl Into<String>, detail: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind: kind.into(),
            detail,
        }
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// Sink for audit events.
pub trait AuditEmitter: Send + Sync {
    fn emit(&self, event: AuditEvent) -> PersistenceResult<()>;
}

/// Writes audit events to the `medidx::audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditEmitter;

impl AuditEmitter for TracingAuditEmitter {
    fn emit(&self, event: AuditEvent) -> PersistenceResult<()> {
        let detail = serde_json::to_string(&event.detail)
            .map_err(|e| PersistenceError(format!("failed to serialize audit detail: {e}")))?;
        tracing::info!(
            target: "medidx::audit",
            id = %event.id,
            ts = event.timestamp_millis(),
            kind = %event.kind,
            detail = %detail,
            "audit"
        );
        Ok(())
    }
}

/// Keeps audit events in memory, newest last.
#[derive(Debug, Default)]
pub struct MemoryAuditEmitter {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl AuditEmitter for MemoryAuditEmitter {
    fn emit(&self, event: AuditEvent) -> PersistenceResult<()> {
        self.events
            .lock()
            .map_err(|_| PersistenceError("audit log lock poisoned".into()))?
            .push(event);
        Ok(())
    }
}
