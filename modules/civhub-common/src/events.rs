//! Structured audit events emitted by the engine.
//!
//! The core does not know how events are delivered — audit and notification
//! systems subscribe through the [`AuditSink`] trait. The in-tree [`LogSink`]
//! writes them to the tracing pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::types::{RunKind, SyncResult};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    RunStarted {
        source_id: Uuid,
        kind: RunKind,
    },
    RunCompleted {
        source_id: Uuid,
        kind: RunKind,
        processed: u32,
        failed: u32,
    },
    RunFailed {
        source_id: Uuid,
        kind: RunKind,
        error: String,
    },
    SourceUnchanged {
        source_id: Uuid,
        url: String,
    },
    PageRetryExhausted {
        source_id: Uuid,
        cursor: Option<String>,
        attempts: u32,
    },
    EntityCreated {
        entity_id: Uuid,
        name: String,
    },
    EntityMerged {
        entity_id: Uuid,
        external_id: String,
        similarity: f64,
    },
    ReviewQueued {
        external_id: String,
        best_match: Option<Uuid>,
        similarity: Option<f64>,
    },
    SyncCompleted {
        source_id: Uuid,
        result: SyncResult,
    },
}

/// Timestamped envelope around one event, in emission order.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AuditEvent,
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

/// Default sink: serialize each event into the structured log stream.
pub struct LogSink;

impl AuditSink for LogSink {
    fn emit(&self, event: AuditEvent) {
        let entry = AuditEntry {
            ts: Utc::now(),
            event,
        };
        match serde_json::to_string(&entry) {
            Ok(json) => info!(target: "civhub::audit", %json, "audit event"),
            Err(e) => tracing::warn!(error = %e, "failed to serialize audit event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = AuditEvent::EntityCreated {
            entity_id: Uuid::nil(),
            name: "Musterstadt".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "entity_created");
        assert_eq!(json["name"], "Musterstadt");
    }
}
