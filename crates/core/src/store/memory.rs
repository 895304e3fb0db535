//! In-memory store implementations.

use super::{
    apply_soft_delete, apply_update, check_version, group_candidates, CandidateGroup, MatchKey,
    PatientReference, PatientStore, ReferenceCollection, ReferenceStore,
};
use crate::error::{PatientError, PatientResult};
use crate::identity::{ActorId, PatientId, TenantId};
use crate::merge::MergedFields;
use crate::patient::PatientRecord;
use std::collections::HashMap;
use std::sync::RwLock;

type TenantPatients = HashMap<PatientId, PatientRecord>;

/// Patient documents held in a per-tenant map.
#[derive(Debug, Default)]
pub struct MemoryPatientStore {
    tenants: RwLock<HashMap<TenantId, TenantPatients>>,
}

impl MemoryPatientStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_active<T>(
        &self,
        tenant: &TenantId,
        f: impl FnOnce(&mut dyn Iterator<Item = &PatientRecord>) -> T,
    ) -> PatientResult<T> {
        let guard = self
            .tenants
            .read()
            .map_err(|_| PatientError::LockPoisoned("patients"))?;
        let mut iter = guard
            .get(tenant)
            .into_iter()
            .flat_map(|patients| patients.values())
            .filter(|record| record.is_active());
        Ok(f(&mut iter))
    }

    fn mutate_live(
        &self,
        tenant: &TenantId,
        id: &PatientId,
        expected_version: Option<u64>,
        f: impl FnOnce(&mut PatientRecord),
    ) -> PatientResult<PatientRecord> {
        let mut guard = self
            .tenants
            .write()
            .map_err(|_| PatientError::LockPoisoned("patients"))?;
        let record = guard
            .get_mut(tenant)
            .and_then(|patients| patients.get_mut(id))
            .filter(|record| record.is_active())
            .ok_or_else(|| PatientError::NotFound { id: id.clone() })?;

        check_version(record, expected_version)?;
        f(record);
        Ok(record.clone())
    }
}

impl PatientStore for MemoryPatientStore {
    fn find_by_id(&self, tenant: &TenantId, id: &PatientId) -> PatientResult<Option<PatientRecord>> {
        let guard = self
            .tenants
            .read()
            .map_err(|_| PatientError::LockPoisoned("patients"))?;
        Ok(guard
            .get(tenant)
            .and_then(|patients| patients.get(id))
            .filter(|record| record.is_active())
            .cloned())
    }

    fn find_by_phone(&self, tenant: &TenantId, number: &str) -> PatientResult<Vec<PatientRecord>> {
        self.read_active(tenant, |records| {
            records
                .filter(|r| r.contacts.phones.iter().any(|p| p.number == number))
                .cloned()
                .collect()
        })
    }

    fn find_by_email(&self, tenant: &TenantId, address: &str) -> PatientResult<Vec<PatientRecord>> {
        self.read_active(tenant, |records| {
            records
                .filter(|r| r.contacts.emails.iter().any(|e| e.address == address))
                .cloned()
                .collect()
        })
    }

    fn find_many(&self, tenant: &TenantId, ids: &[PatientId]) -> PatientResult<Vec<PatientRecord>> {
        let guard = self
            .tenants
            .read()
            .map_err(|_| PatientError::LockPoisoned("patients"))?;
        let Some(patients) = guard.get(tenant) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| patients.get(id))
            .filter(|record| record.is_active())
            .cloned()
            .collect())
    }

    fn insert(&self, record: PatientRecord) -> PatientResult<PatientRecord> {
        let mut guard = self
            .tenants
            .write()
            .map_err(|_| PatientError::LockPoisoned("patients"))?;
        let patients = guard.entry(record.tenant_id.clone()).or_default();
        if patients.contains_key(&record.id) {
            return Err(PatientError::AlreadyExists {
                id: record.id.clone(),
            });
        }
        patients.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update(
        &self,
        tenant: &TenantId,
        id: &PatientId,
        fields: &MergedFields,
        actor: &ActorId,
        expected_version: Option<u64>,
    ) -> PatientResult<PatientRecord> {
        self.mutate_live(tenant, id, expected_version, |record| {
            apply_update(record, fields, actor)
        })
    }

    fn soft_delete(
        &self,
        tenant: &TenantId,
        id: &PatientId,
        actor: &ActorId,
        expected_version: Option<u64>,
    ) -> PatientResult<PatientRecord> {
        self.mutate_live(tenant, id, expected_version, |record| {
            apply_soft_delete(record, actor)
        })
    }

    fn aggregate_duplicate_candidates(
        &self,
        tenant: &TenantId,
        key: MatchKey,
    ) -> PatientResult<Vec<CandidateGroup>> {
        self.read_active(tenant, |records| group_candidates(records, key))
    }
}

/// Relationship or timeline documents held in a per-tenant list.
#[derive(Debug)]
pub struct MemoryReferenceStore {
    collection: ReferenceCollection,
    tenants: RwLock<HashMap<TenantId, Vec<PatientReference>>>,
}

impl MemoryReferenceStore {
    pub fn new(collection: ReferenceCollection) -> Self {
        Self {
            collection,
            tenants: RwLock::new(HashMap::new()),
        }
    }
}

impl ReferenceStore for MemoryReferenceStore {
    fn collection(&self) -> ReferenceCollection {
        self.collection
    }

    fn insert(&self, reference: PatientReference) -> PatientResult<()> {
        let mut guard = self
            .tenants
            .write()
            .map_err(|_| PatientError::LockPoisoned(self.collection.as_str()))?;
        guard
            .entry(reference.tenant_id.clone())
            .or_default()
            .push(reference);
        Ok(())
    }

    fn list_for_patient(
        &self,
        tenant: &TenantId,
        patient: &PatientId,
    ) -> PatientResult<Vec<PatientReference>> {
        let guard = self
            .tenants
            .read()
            .map_err(|_| PatientError::LockPoisoned(self.collection.as_str()))?;
        Ok(guard
            .get(tenant)
            .map(|references| {
                references
                    .iter()
                    .filter(|r| r.mentions(patient))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn reassign_owner(
        &self,
        old: &PatientId,
        new: &PatientId,
        tenant: &TenantId,
    ) -> PatientResult<usize> {
        let mut guard = self
            .tenants
            .write()
            .map_err(|_| PatientError::LockPoisoned(self.collection.as_str()))?;
        let Some(references) = guard.get_mut(tenant) else {
            return Ok(0);
        };
        Ok(references
            .iter_mut()
            .map(|r| r.reassign(old, new))
            .filter(|changed| *changed)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patient::{PatientStatus, PersonInfo, Phone};
    use chrono::NaiveDate;

    fn tenant(name: &str) -> TenantId {
        TenantId::new(name).unwrap()
    }

    fn record(tenant_id: &TenantId, first: &str, phone: &str) -> PatientRecord {
        let mut record = PatientRecord::new(
            tenant_id.clone(),
            "org-1",
            PersonInfo {
                first_name: first.into(),
                last_name: "Georgescu".into(),
                middle_name: None,
                date_of_birth: NaiveDate::from_ymd_opt(1975, 6, 30).unwrap(),
                gender: None,
            },
        );
        record.contacts.phones.push(Phone {
            kind: "mobile".into(),
            number: phone.into(),
            is_primary: true,
            is_active: true,
        });
        record
    }

    #[test]
    fn test_find_by_id_is_tenant_scoped() {
        let store = MemoryPatientStore::new();
        let t1 = tenant("t1");
        let t2 = tenant("t2");
        let stored = store.insert(record(&t1, "Dan", "0700")).unwrap();

        assert!(store.find_by_id(&t1, &stored.id).unwrap().is_some());
        assert!(store.find_by_id(&t2, &stored.id).unwrap().is_none());
        assert!(store.find_by_id(&t1, &PatientId::new()).unwrap().is_none());
    }

    #[test]
    fn test_insert_rejects_existing_id() {
        let store = MemoryPatientStore::new();
        let t1 = tenant("t1");
        let stored = store.insert(record(&t1, "Dan", "0700")).unwrap();

        let err = store.insert(stored).expect_err("second insert should fail");
        assert!(matches!(err, PatientError::AlreadyExists { .. }));
    }

    #[test]
    fn test_soft_delete_hides_record_and_archives_it() {
        let store = MemoryPatientStore::new();
        let t1 = tenant("t1");
        let stored = store.insert(record(&t1, "Dan", "0700")).unwrap();
        let actor = ActorId::new("dr-who").unwrap();

        let deleted = store
            .soft_delete(&t1, &stored.id, &actor, Some(1))
            .expect("soft delete should succeed");

        assert!(deleted.is_deleted);
        assert_eq!(deleted.status, PatientStatus::Archived);
        assert_eq!(deleted.deleted_by, Some(actor.clone()));
        assert_eq!(deleted.version, 2);
        assert!(deleted.deleted_at.is_some());
        assert!(store.find_by_id(&t1, &stored.id).unwrap().is_none());
        assert!(store.find_by_phone(&t1, "0700").unwrap().is_empty());

        let again = store
            .soft_delete(&t1, &stored.id, &actor, None)
            .expect_err("deleted record should be treated as missing");
        assert!(matches!(again, PatientError::NotFound { .. }));
    }

    #[test]
    fn test_update_checks_version() {
        let store = MemoryPatientStore::new();
        let t1 = tenant("t1");
        let stored = store.insert(record(&t1, "Dan", "0700")).unwrap();
        let actor = ActorId::new("dr-who").unwrap();
        let mut fields = MergedFields::from_record(&stored);
        fields.tags.push("vip".into());

        let err = store
            .update(&t1, &stored.id, &fields, &actor, Some(7))
            .expect_err("stale version should conflict");
        assert!(matches!(err, PatientError::VersionConflict { actual: 1, .. }));
        assert!(store.find_by_id(&t1, &stored.id).unwrap().unwrap().tags.is_empty());

        let updated = store
            .update(&t1, &stored.id, &fields, &actor, Some(1))
            .expect("current version should succeed");
        assert_eq!(updated.version, 2);
        assert_eq!(updated.tags, vec!["vip".to_string()]);
        assert_eq!(updated.updated_by, Some(actor));
    }

    #[test]
    fn test_find_many_skips_missing_and_other_tenants() {
        let store = MemoryPatientStore::new();
        let t1 = tenant("t1");
        let t2 = tenant("t2");
        let a = store.insert(record(&t1, "Dan", "0700")).unwrap();
        let b = store.insert(record(&t2, "Dan", "0700")).unwrap();

        let found = store
            .find_many(&t1, &[a.id.clone(), b.id.clone(), PatientId::new()])
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a.id);
    }

    #[test]
    fn test_aggregate_never_mixes_tenants() {
        let store = MemoryPatientStore::new();
        let t1 = tenant("t1");
        let t2 = tenant("t2");
        store.insert(record(&t1, "Dan", "0700")).unwrap();
        store.insert(record(&t2, "Dan", "0700")).unwrap();

        assert!(store
            .aggregate_duplicate_candidates(&t1, MatchKey::Phone)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_reference_store_reassigns_within_tenant_only() {
        let store = MemoryReferenceStore::new(ReferenceCollection::Timeline);
        let t1 = tenant("t1");
        let t2 = tenant("t2");
        let old = PatientId::new();
        let new = PatientId::new();

        store
            .insert(PatientReference::new(t1.clone(), old.clone(), "appointment"))
            .unwrap();
        store
            .insert(PatientReference::new(t1.clone(), old.clone(), "xray"))
            .unwrap();
        store
            .insert(PatientReference::new(t2.clone(), old.clone(), "appointment"))
            .unwrap();

        assert_eq!(store.reassign_owner(&old, &new, &t1).unwrap(), 2);
        assert_eq!(store.list_for_patient(&t1, &new).unwrap().len(), 2);
        assert!(store.list_for_patient(&t1, &old).unwrap().is_empty());
        assert_eq!(store.list_for_patient(&t2, &old).unwrap().len(), 1);
    }
}
