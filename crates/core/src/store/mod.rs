//! Persistence interfaces consumed by duplicate detection and merge.
//!
//! Every method takes the [`TenantId`] explicitly and backends filter on it before anything
//! else, so a record from another tenant is indistinguishable from a missing one.
//!
//! Two backends are provided:
//! - [`memory`]: lock-guarded maps, used by tests and `STORAGE_BACKEND=memory`
//! - [`file`]: one JSON document per patient in a sharded directory tree

pub mod file;
pub mod memory;

use crate::config::{CoreConfig, StorageBackend};
use crate::constants::FIRST_NAME_PREFIX_LEN;
use crate::error::PatientResult;
use crate::identity::{ActorId, PatientId, TenantId};
use crate::merge::MergedFields;
use crate::patient::PatientRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Signal used to group duplicate candidates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchKey {
    /// Exact stored phone number.
    Phone,
    /// Exact stored email address.
    Email,
    /// Lowercased last name, first three characters of the lowercased first name, and
    /// date of birth.
    NameDob,
}

impl MatchKey {
    /// Passes in the order the detector runs them.
    pub const ALL: [MatchKey; 3] = [MatchKey::Phone, MatchKey::Email, MatchKey::NameDob];

    pub fn as_str(self) -> &'static str {
        match self {
            MatchKey::Phone => "phone",
            MatchKey::Email => "email",
            MatchKey::NameDob => "nameDob",
        }
    }

    /// Key values `record` contributes under this signal.
    pub fn keys_for(self, record: &PatientRecord) -> Vec<String> {
        match self {
            MatchKey::Phone => record
                .contacts
                .phones
                .iter()
                .map(|p| p.number.clone())
                .collect(),
            MatchKey::Email => record
                .contacts
                .emails
                .iter()
                .map(|e| e.address.clone())
                .collect(),
            MatchKey::NameDob => {
                let person = &record.person;
                let first_prefix: String = person
                    .first_name
                    .to_lowercase()
                    .chars()
                    .take(FIRST_NAME_PREFIX_LEN)
                    .collect();
                vec![format!(
                    "{}|{}|{}",
                    person.last_name.to_lowercase(),
                    first_prefix,
                    person.date_of_birth
                )]
            }
        }
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One bucket of the duplicate-candidate aggregation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateGroup {
    pub key: String,
    pub member_ids: Vec<PatientId>,
}

/// Groups active records by `key`, keeping buckets with two or more distinct patients.
///
/// Buckets are ordered by key and member ids are sorted, so the result is deterministic for a
/// given set of records.
pub fn group_candidates<'a>(
    records: impl IntoIterator<Item = &'a PatientRecord>,
    key: MatchKey,
) -> Vec<CandidateGroup> {
    let mut buckets: BTreeMap<String, BTreeSet<PatientId>> = BTreeMap::new();
    for record in records.into_iter().filter(|r| r.is_active()) {
        for value in key.keys_for(record) {
            buckets.entry(value).or_default().insert(record.id.clone());
        }
    }

    buckets
        .into_iter()
        .filter(|(_, ids)| ids.len() >= 2)
        .map(|(key, ids)| CandidateGroup {
            key,
            member_ids: ids.into_iter().collect(),
        })
        .collect()
}

/// Tenant-scoped persistence for patient documents.
///
/// Lookups only ever return non-deleted records.
pub trait PatientStore: Send + Sync {
    fn find_by_id(&self, tenant: &TenantId, id: &PatientId) -> PatientResult<Option<PatientRecord>>;

    fn find_by_phone(&self, tenant: &TenantId, number: &str) -> PatientResult<Vec<PatientRecord>>;

    fn find_by_email(&self, tenant: &TenantId, address: &str) -> PatientResult<Vec<PatientRecord>>;

    /// Loads the listed patients, silently skipping missing or deleted ones.
    fn find_many(&self, tenant: &TenantId, ids: &[PatientId]) -> PatientResult<Vec<PatientRecord>>;

    /// Stores a new record. Fails with `AlreadyExists` if the id is taken in any state.
    fn insert(&self, record: PatientRecord) -> PatientResult<PatientRecord>;

    /// Writes merged fields onto a live record, bumping its version and `updatedBy`.
    ///
    /// With `expected_version` set, the write only happens if the stored version still
    /// matches; otherwise `VersionConflict` is returned and nothing changes.
    fn update(
        &self,
        tenant: &TenantId,
        id: &PatientId,
        fields: &MergedFields,
        actor: &ActorId,
        expected_version: Option<u64>,
    ) -> PatientResult<PatientRecord>;

    /// Archives a live record (`isDeleted`, `deletedAt`, `deletedBy`, `status=archived`).
    fn soft_delete(
        &self,
        tenant: &TenantId,
        id: &PatientId,
        actor: &ActorId,
        expected_version: Option<u64>,
    ) -> PatientResult<PatientRecord>;

    fn aggregate_duplicate_candidates(
        &self,
        tenant: &TenantId,
        key: MatchKey,
    ) -> PatientResult<Vec<CandidateGroup>>;
}

/// Which downstream collection a [`ReferenceStore`] holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReferenceCollection {
    Relationships,
    Timeline,
}

impl ReferenceCollection {
    pub fn as_str(self) -> &'static str {
        match self {
            ReferenceCollection::Relationships => "relationships",
            ReferenceCollection::Timeline => "timeline",
        }
    }
}

/// A relationship or timeline document that points at a patient.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientReference {
    pub id: PatientId,
    pub tenant_id: TenantId,
    pub patient_id: PatientId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_patient_id: Option<PatientId>,
    pub kind: String,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl PatientReference {
    pub fn new(tenant_id: TenantId, patient_id: PatientId, kind: impl Into<String>) -> Self {
        Self {
            id: PatientId::new(),
            tenant_id,
            patient_id,
            related_patient_id: None,
            kind: kind.into(),
            recorded_at: Utc::now(),
            attributes: serde_json::Map::new(),
        }
    }

    pub fn mentions(&self, patient: &PatientId) -> bool {
        &self.patient_id == patient || self.related_patient_id.as_ref() == Some(patient)
    }

    /// Repoints every mention of `old` to `new`. Returns whether anything changed.
    pub fn reassign(&mut self, old: &PatientId, new: &PatientId) -> bool {
        let mut changed = false;
        if &self.patient_id == old {
            self.patient_id = new.clone();
            changed = true;
        }
        if self.related_patient_id.as_ref() == Some(old) {
            self.related_patient_id = Some(new.clone());
            changed = true;
        }
        changed
    }
}

/// Downstream store whose documents reference patients by id.
pub trait ReferenceStore: Send + Sync {
    fn collection(&self) -> ReferenceCollection;

    fn insert(&self, reference: PatientReference) -> PatientResult<()>;

    fn list_for_patient(
        &self,
        tenant: &TenantId,
        patient: &PatientId,
    ) -> PatientResult<Vec<PatientReference>>;

    /// Repoints every reference to `old` onto `new`, returning how many documents changed.
    fn reassign_owner(
        &self,
        old: &PatientId,
        new: &PatientId,
        tenant: &TenantId,
    ) -> PatientResult<usize>;
}

/// The stores a process works against, opened from configuration.
#[derive(Clone)]
pub struct StoreSet {
    pub patients: Arc<dyn PatientStore>,
    pub relationships: Arc<dyn ReferenceStore>,
    pub timeline: Arc<dyn ReferenceStore>,
}

impl StoreSet {
    pub fn open(cfg: &CoreConfig) -> PatientResult<Self> {
        match cfg.storage_backend() {
            StorageBackend::Memory => Ok(Self::in_memory()),
            StorageBackend::File => {
                let dir = cfg.patient_data_dir();
                Ok(Self {
                    patients: Arc::new(file::FilePatientStore::open(dir)?),
                    relationships: Arc::new(file::FileReferenceStore::open(
                        dir,
                        ReferenceCollection::Relationships,
                    )?),
                    timeline: Arc::new(file::FileReferenceStore::open(
                        dir,
                        ReferenceCollection::Timeline,
                    )?),
                })
            }
        }
    }

    pub fn in_memory() -> Self {
        Self {
            patients: Arc::new(memory::MemoryPatientStore::new()),
            relationships: Arc::new(memory::MemoryReferenceStore::new(
                ReferenceCollection::Relationships,
            )),
            timeline: Arc::new(memory::MemoryReferenceStore::new(
                ReferenceCollection::Timeline,
            )),
        }
    }

    pub fn reference_stores(&self) -> Vec<Arc<dyn ReferenceStore>> {
        vec![self.relationships.clone(), self.timeline.clone()]
    }
}

/// Shared conditional-write check used by both backends.
pub(crate) fn check_version(
    record: &PatientRecord,
    expected_version: Option<u64>,
) -> PatientResult<()> {
    match expected_version {
        Some(expected) if expected != record.version => {
            Err(crate::PatientError::VersionConflict {
                id: record.id.clone(),
                expected,
                actual: record.version,
            })
        }
        _ => Ok(()),
    }
}

/// Applies merged fields and update bookkeeping to a record in place.
pub(crate) fn apply_update(record: &mut PatientRecord, fields: &MergedFields, actor: &ActorId) {
    fields.apply_to(record);
    record.version += 1;
    record.updated_at = Utc::now();
    record.updated_by = Some(actor.clone());
}

/// Applies soft-delete bookkeeping to a record in place.
pub(crate) fn apply_soft_delete(record: &mut PatientRecord, actor: &ActorId) {
    let now = Utc::now();
    record.is_deleted = true;
    record.deleted_at = Some(now);
    record.deleted_by = Some(actor.clone());
    record.status = crate::patient::PatientStatus::Archived;
    record.version += 1;
    record.updated_at = now;
    record.updated_by = Some(actor.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patient::{Email, PersonInfo, Phone};
    use chrono::NaiveDate;

    fn record(first: &str, last: &str, dob: (i32, u32, u32)) -> PatientRecord {
        PatientRecord::new(
            TenantId::new("t1").unwrap(),
            "org-1",
            PersonInfo {
                first_name: first.into(),
                last_name: last.into(),
                middle_name: None,
                date_of_birth: NaiveDate::from_ymd_opt(dob.0, dob.1, dob.2).unwrap(),
                gender: None,
            },
        )
    }

    fn with_phone(mut record: PatientRecord, number: &str) -> PatientRecord {
        record.contacts.phones.push(Phone {
            kind: "mobile".into(),
            number: number.into(),
            is_primary: false,
            is_active: true,
        });
        record
    }

    #[test]
    fn test_name_dob_key_uses_first_name_prefix() {
        let a = record("Alexandru", "Popa", (1980, 3, 1));
        let b = record("ALEXANDRA", "POPA", (1980, 3, 1));

        assert_eq!(
            MatchKey::NameDob.keys_for(&a),
            vec!["popa|ale|1980-03-01".to_string()]
        );
        assert_eq!(MatchKey::NameDob.keys_for(&a), MatchKey::NameDob.keys_for(&b));
    }

    #[test]
    fn test_name_dob_key_handles_short_first_names() {
        let a = record("Io", "Popa", (1980, 3, 1));
        assert_eq!(
            MatchKey::NameDob.keys_for(&a),
            vec!["popa|io|1980-03-01".to_string()]
        );
    }

    #[test]
    fn test_group_candidates_requires_two_distinct_patients() {
        // Same number listed twice on one patient is not a duplicate.
        let lone = with_phone(with_phone(record("A", "X", (1990, 1, 1)), "0700"), "0700");
        let a = with_phone(record("B", "Y", (1991, 1, 1)), "0711");
        let b = with_phone(record("C", "Z", (1992, 1, 1)), "0711");

        let groups = group_candidates([&lone, &a, &b], MatchKey::Phone);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, "0711");
        let mut expected = vec![a.id.clone(), b.id.clone()];
        expected.sort();
        assert_eq!(groups[0].member_ids, expected);
    }

    #[test]
    fn test_group_candidates_ignores_deleted_records() {
        let a = with_phone(record("B", "Y", (1991, 1, 1)), "0711");
        let mut b = with_phone(record("C", "Z", (1992, 1, 1)), "0711");
        b.is_deleted = true;

        assert!(group_candidates([&a, &b], MatchKey::Phone).is_empty());
    }

    #[test]
    fn test_email_key_is_exact() {
        let mut a = record("A", "X", (1990, 1, 1));
        a.contacts.emails.push(Email {
            kind: "personal".into(),
            address: "ana@example.com".into(),
            is_primary: true,
            is_verified: true,
        });
        let mut b = record("B", "Y", (1990, 1, 1));
        b.contacts.emails.push(Email {
            kind: "personal".into(),
            address: "Ana@example.com".into(),
            is_primary: true,
            is_verified: false,
        });

        assert!(group_candidates([&a, &b], MatchKey::Email).is_empty());
    }

    #[test]
    fn test_reference_reassign_updates_both_sides() {
        let tenant = TenantId::new("t1").unwrap();
        let old = PatientId::new();
        let new = PatientId::new();
        let mut reference = PatientReference::new(tenant, old.clone(), "guardian");
        reference.related_patient_id = Some(old.clone());

        assert!(reference.reassign(&old, &new));
        assert_eq!(reference.patient_id, new);
        assert_eq!(reference.related_patient_id, Some(new.clone()));
        assert!(!reference.reassign(&old, &new));
    }

    #[test]
    fn test_check_version() {
        let r = record("A", "X", (1990, 1, 1));
        assert!(check_version(&r, None).is_ok());
        assert!(check_version(&r, Some(1)).is_ok());
        assert!(matches!(
            check_version(&r, Some(4)),
            Err(crate::PatientError::VersionConflict {
                expected: 4,
                actual: 1,
                ..
            })
        ));
    }
}
