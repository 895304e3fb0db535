//! Multi-step patient merge.
//!
//! There is no transaction around a merge. Safety comes from three properties instead:
//! - the master is always updated before the duplicate is soft-deleted, so a crash in
//!   between leaves both records live and the merge can simply be retried;
//! - [`MergeResolver::combine`] is idempotent, so that retry does not duplicate data;
//! - both writes are conditional on the version read at the start, so a concurrent edit
//!   surfaces as a retryable `VersionConflict` instead of being overwritten.
//!
//! Reference reassignment is best effort and never fails a merge.

use super::resolver::MergeResolver;
use crate::duplicates::{DuplicateDetector, DuplicateGroup, DuplicateProbe};
use crate::error::{PatientError, PatientResult};
use crate::events::{DomainEvent, EventPublisher, PatientMerged};
use crate::identity::{parse_patient_id, ActorId, PatientId, TenantId};
use crate::patient::{PatientRecord, PatientSummary};
use crate::store::{PatientStore, ReferenceStore, StoreSet};
use chrono::Utc;
use std::sync::Arc;

/// Which record survives and which is folded into it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeRequest {
    pub master_id: PatientId,
    pub duplicate_id: PatientId,
}

impl MergeRequest {
    pub fn new(master_id: PatientId, duplicate_id: PatientId) -> Self {
        Self {
            master_id,
            duplicate_id,
        }
    }

    /// Parses externally supplied ids. Malformed ids are validation errors.
    pub fn parse(master_id: &str, duplicate_id: &str) -> PatientResult<Self> {
        Ok(Self {
            master_id: parse_patient_id("masterId", master_id)?,
            duplicate_id: parse_patient_id("duplicateId", duplicate_id)?,
        })
    }

    pub fn is_self_merge(&self) -> bool {
        self.master_id == self.duplicate_id
    }
}

#[derive(Clone)]
pub struct MergeCoordinator {
    patients: Arc<dyn PatientStore>,
    references: Vec<Arc<dyn ReferenceStore>>,
    events: Arc<dyn EventPublisher>,
    detector: DuplicateDetector,
}

impl MergeCoordinator {
    pub fn new(
        patients: Arc<dyn PatientStore>,
        references: Vec<Arc<dyn ReferenceStore>>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            detector: DuplicateDetector::new(patients.clone()),
            patients,
            references,
            events,
        }
    }

    pub fn from_stores(stores: &StoreSet, events: Arc<dyn EventPublisher>) -> Self {
        Self::new(stores.patients.clone(), stores.reference_stores(), events)
    }

    /// Folds `request.duplicate_id` into `request.master_id` and returns the updated master.
    pub fn merge(
        &self,
        request: &MergeRequest,
        tenant: &TenantId,
        actor: &ActorId,
    ) -> PatientResult<PatientRecord> {
        if request.is_self_merge() {
            return Err(PatientError::SelfMerge);
        }

        let span = tracing::info_span!(
            "merge",
            tenant = %tenant,
            master = %request.master_id,
            duplicate = %request.duplicate_id
        );
        let _enter = span.enter();

        let master = self.load(tenant, &request.master_id)?;
        let duplicate = self.load(tenant, &request.duplicate_id)?;

        let merged = MergeResolver::combine(&master, &duplicate);

        let updated = self.patients.update(
            tenant,
            &master.id,
            &merged,
            actor,
            Some(master.version),
        )?;
        self.patients
            .soft_delete(tenant, &duplicate.id, actor, Some(duplicate.version))?;

        self.reassign_references(tenant, &duplicate.id, &master.id);

        self.events
            .publish(&DomainEvent::PatientMerged(PatientMerged {
                master_id: master.id.clone(),
                duplicate_id: duplicate.id.clone(),
                tenant_id: tenant.clone(),
                organization_id: master.organization_id.clone(),
                merged_at: Utc::now(),
            }));

        tracing::info!(version = updated.version, "merge complete");
        Ok(updated)
    }

    fn load(&self, tenant: &TenantId, id: &PatientId) -> PatientResult<PatientRecord> {
        self.patients
            .find_by_id(tenant, id)?
            .ok_or_else(|| PatientError::NotFound { id: id.clone() })
    }

    fn reassign_references(&self, tenant: &TenantId, old: &PatientId, new: &PatientId) {
        for store in &self.references {
            let collection = store.collection().as_str();
            match store.reassign_owner(old, new, tenant) {
                Ok(count) => tracing::info!(collection, count, "references reassigned"),
                Err(e) => tracing::warn!(collection, "failed to reassign references: {e}"),
            }
        }
    }

    pub fn find_duplicates(&self, tenant: &TenantId) -> PatientResult<Vec<DuplicateGroup>> {
        self.detector.scan(tenant)
    }

    pub fn find_matches(
        &self,
        tenant: &TenantId,
        probe: &DuplicateProbe,
    ) -> PatientResult<Vec<PatientSummary>> {
        self.detector.find_matches(tenant, probe)
    }

    /// A single live patient, or `NotFound`.
    pub fn patient(&self, tenant: &TenantId, id: &PatientId) -> PatientResult<PatientRecord> {
        self.load(tenant, id)
    }
}
