//! Domain events emitted after state changes.
//!
//! Publishing is fire-and-forget: a publisher never fails the operation that produced the
//! event.

use crate::constants::PATIENT_MERGED_EVENT;
use crate::identity::{PatientId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientMerged {
    pub master_id: PatientId,
    pub duplicate_id: PatientId,
    pub tenant_id: TenantId,
    pub organization_id: String,
    pub merged_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DomainEvent {
    PatientMerged(PatientMerged),
}

impl DomainEvent {
    /// Routing name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::PatientMerged(_) => PATIENT_MERGED_EVENT,
        }
    }
}

pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: &DomainEvent);
}

/// Emits each event as a structured `tracing` record.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventPublisher;

impl EventPublisher for TracingEventPublisher {
    fn publish(&self, event: &DomainEvent) {
        match serde_json::to_string(event) {
            Ok(payload) => tracing::info!(event = event.name(), payload = %payload, "domain event"),
            Err(e) => tracing::warn!(event = event.name(), "failed to encode domain event: {e}"),
        }
    }
}

/// Keeps published events in memory for inspection.
#[derive(Debug, Default)]
pub struct MemoryEventPublisher {
    events: Mutex<Vec<DomainEvent>>,
}

impl MemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far, oldest first.
    pub fn events(&self) -> Vec<DomainEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventPublisher for MemoryEventPublisher {
    fn publish(&self, event: &DomainEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merged() -> DomainEvent {
        DomainEvent::PatientMerged(PatientMerged {
            master_id: PatientId::new(),
            duplicate_id: PatientId::new(),
            tenant_id: TenantId::new("t1").unwrap(),
            organization_id: "org-1".into(),
            merged_at: Utc::now(),
        })
    }

    #[test]
    fn test_event_name() {
        assert_eq!(merged().name(), "patient.merged");
    }

    #[test]
    fn test_payload_is_camel_case() {
        let json = serde_json::to_value(merged()).expect("serialise");
        assert!(json.get("masterId").is_some());
        assert!(json.get("duplicateId").is_some());
        assert_eq!(json["tenantId"], "t1");
        assert_eq!(json["organizationId"], "org-1");
    }

    #[test]
    fn test_memory_publisher_records_in_order() {
        let publisher = MemoryEventPublisher::new();
        let first = merged();
        let second = merged();
        publisher.publish(&first);
        publisher.publish(&second);

        assert_eq!(publisher.events(), vec![first, second]);
    }

    #[test]
    fn test_tracing_publisher_does_not_panic() {
        TracingEventPublisher.publish(&merged());
    }
}
