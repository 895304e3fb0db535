//! File-backed document stores.
//!
//! ## Storage Layout
//!
//! ```text
//! <patient_data_dir>/
//!   <tenant>/
//!     patients/
//!       <s1>/<s2>/<uuid>/patient.json
//!     relationships.json
//!     timeline.json
//! ```
//!
//! `s1` and `s2` are the first four hex characters of the patient UUID. Documents are written
//! to a temporary file and renamed into place, so readers never observe a half-written file.
//! Read-modify-write cycles are serialised by a process-local mutex; the store assumes it is
//! the only writer to its directory.

use super::{
    apply_soft_delete, apply_update, check_version, group_candidates, CandidateGroup, MatchKey,
    PatientReference, PatientStore, ReferenceCollection, ReferenceStore,
};
use crate::constants::{
    PATIENTS_DIR_NAME, PATIENT_JSON_FILENAME, RELATIONSHIPS_FILENAME, TIMELINE_FILENAME,
};
use crate::error::{PatientError, PatientResult};
use crate::identity::{ActorId, PatientId, TenantId};
use crate::merge::MergedFields;
use crate::patient::PatientRecord;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

fn ensure_dir(path: &Path) -> PatientResult<()> {
    fs::create_dir_all(path).map_err(PatientError::StorageDirCreation)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> PatientResult<Option<T>> {
    match fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents)
            .map(Some)
            .map_err(PatientError::Deserialization),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PatientError::FileRead(e)),
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> PatientResult<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let json = serde_json::to_string_pretty(value).map_err(PatientError::Serialization)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(PatientError::FileWrite)?;
    fs::rename(&tmp, path).map_err(PatientError::FileWrite)
}

fn lock<'a>(mutex: &'a Mutex<()>, name: &'static str) -> PatientResult<std::sync::MutexGuard<'a, ()>> {
    mutex.lock().map_err(|_| PatientError::LockPoisoned(name))
}

/// Patient documents stored as sharded JSON files.
#[derive(Debug)]
pub struct FilePatientStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FilePatientStore {
    /// Opens (creating if needed) a store rooted at `patient_data_dir`.
    pub fn open(patient_data_dir: &Path) -> PatientResult<Self> {
        ensure_dir(patient_data_dir)?;
        Ok(Self {
            root: patient_data_dir.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    fn patients_dir(&self, tenant: &TenantId) -> PathBuf {
        self.root.join(tenant.as_str()).join(PATIENTS_DIR_NAME)
    }

    fn document_path(&self, tenant: &TenantId, id: &PatientId) -> PathBuf {
        id.sharded_dir(&self.patients_dir(tenant))
            .join(PATIENT_JSON_FILENAME)
    }

    /// Reads one document, treating a record filed under the wrong tenant as absent.
    fn load(&self, tenant: &TenantId, id: &PatientId) -> PatientResult<Option<PatientRecord>> {
        let record: Option<PatientRecord> = read_json(&self.document_path(tenant, id))?;
        Ok(record.filter(|r| &r.tenant_id == tenant && &r.id == id))
    }

    fn load_live(&self, tenant: &TenantId, id: &PatientId) -> PatientResult<PatientRecord> {
        self.load(tenant, id)?
            .filter(|r| r.is_active())
            .ok_or_else(|| PatientError::NotFound { id: id.clone() })
    }

    /// Walks `<tenant>/patients/<s1>/<s2>/<uuid>/patient.json` and returns every active record.
    ///
    /// Documents that cannot be parsed are logged and skipped.
    fn scan_active(&self, tenant: &TenantId) -> PatientResult<Vec<PatientRecord>> {
        let mut records = Vec::new();

        let s1_iter = match fs::read_dir(self.patients_dir(tenant)) {
            Ok(it) => it,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(records),
            Err(e) => return Err(PatientError::FileRead(e)),
        };

        for s1 in s1_iter {
            let s1_path = s1.map_err(PatientError::FileRead)?.path();
            if !s1_path.is_dir() {
                continue;
            }
            for s2 in fs::read_dir(&s1_path).map_err(PatientError::FileRead)? {
                let s2_path = s2.map_err(PatientError::FileRead)?.path();
                if !s2_path.is_dir() {
                    continue;
                }
                for id_ent in fs::read_dir(&s2_path).map_err(PatientError::FileRead)? {
                    let patient_path = id_ent
                        .map_err(PatientError::FileRead)?
                        .path()
                        .join(PATIENT_JSON_FILENAME);
                    if !patient_path.is_file() {
                        continue;
                    }

                    match read_json::<PatientRecord>(&patient_path) {
                        Ok(Some(record)) if &record.tenant_id == tenant => {
                            if record.is_active() {
                                records.push(record);
                            }
                        }
                        Ok(Some(_)) => {
                            tracing::warn!(
                                "patient document filed under wrong tenant: {}",
                                patient_path.display()
                            );
                        }
                        Ok(None) => {}
                        Err(PatientError::Deserialization(e)) => {
                            tracing::warn!(
                                "failed to parse patient document: {} - {}",
                                patient_path.display(),
                                e
                            );
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        Ok(records)
    }

    fn mutate_live(
        &self,
        tenant: &TenantId,
        id: &PatientId,
        expected_version: Option<u64>,
        f: impl FnOnce(&mut PatientRecord),
    ) -> PatientResult<PatientRecord> {
        let _guard = lock(&self.write_lock, "patients")?;
        let mut record = self.load_live(tenant, id)?;
        check_version(&record, expected_version)?;
        f(&mut record);
        write_json(&self.document_path(tenant, id), &record)?;
        Ok(record)
    }
}

impl PatientStore for FilePatientStore {
    fn find_by_id(&self, tenant: &TenantId, id: &PatientId) -> PatientResult<Option<PatientRecord>> {
        Ok(self.load(tenant, id)?.filter(|r| r.is_active()))
    }

    fn find_by_phone(&self, tenant: &TenantId, number: &str) -> PatientResult<Vec<PatientRecord>> {
        let mut records = self.scan_active(tenant)?;
        records.retain(|r| r.contacts.phones.iter().any(|p| p.number == number));
        Ok(records)
    }

    fn find_by_email(&self, tenant: &TenantId, address: &str) -> PatientResult<Vec<PatientRecord>> {
        let mut records = self.scan_active(tenant)?;
        records.retain(|r| r.contacts.emails.iter().any(|e| e.address == address));
        Ok(records)
    }

    fn find_many(&self, tenant: &TenantId, ids: &[PatientId]) -> PatientResult<Vec<PatientRecord>> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.find_by_id(tenant, id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn insert(&self, record: PatientRecord) -> PatientResult<PatientRecord> {
        let _guard = lock(&self.write_lock, "patients")?;
        let path = self.document_path(&record.tenant_id, &record.id);
        if path.exists() {
            return Err(PatientError::AlreadyExists {
                id: record.id.clone(),
            });
        }
        write_json(&path, &record)?;
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
        let records = self.scan_active(tenant)?;
        Ok(group_candidates(&records, key))
    }
}

/// Relationship or timeline documents stored as one JSON array per tenant.
#[derive(Debug)]
pub struct FileReferenceStore {
    root: PathBuf,
    collection: ReferenceCollection,
    write_lock: Mutex<()>,
}

impl FileReferenceStore {
    pub fn open(patient_data_dir: &Path, collection: ReferenceCollection) -> PatientResult<Self> {
        ensure_dir(patient_data_dir)?;
        Ok(Self {
            root: patient_data_dir.to_path_buf(),
            collection,
            write_lock: Mutex::new(()),
        })
    }

    fn collection_path(&self, tenant: &TenantId) -> PathBuf {
        let filename = match self.collection {
            ReferenceCollection::Relationships => RELATIONSHIPS_FILENAME,
            ReferenceCollection::Timeline => TIMELINE_FILENAME,
        };
        self.root.join(tenant.as_str()).join(filename)
    }

    /// Every entry in the tenant's file, including any written under another tenant id.
    ///
    /// Writers must put the whole array back so that foreign entries are never dropped.
    fn load_all(&self, tenant: &TenantId) -> PatientResult<Vec<PatientReference>> {
        Ok(read_json(&self.collection_path(tenant))?.unwrap_or_default())
    }
}

impl ReferenceStore for FileReferenceStore {
    fn collection(&self) -> ReferenceCollection {
        self.collection
    }

    fn insert(&self, reference: PatientReference) -> PatientResult<()> {
        let _guard = lock(&self.write_lock, self.collection.as_str())?;
        let tenant = reference.tenant_id.clone();
        let mut references = self.load_all(&tenant)?;
        references.push(reference);
        write_json(&self.collection_path(&tenant), &references)
    }

    fn list_for_patient(
        &self,
        tenant: &TenantId,
        patient: &PatientId,
    ) -> PatientResult<Vec<PatientReference>> {
        let mut references = self.load_all(tenant)?;
        references.retain(|r| &r.tenant_id == tenant && r.mentions(patient));
        Ok(references)
    }

    fn reassign_owner(
        &self,
        old: &PatientId,
        new: &PatientId,
        tenant: &TenantId,
    ) -> PatientResult<usize> {
        let _guard = lock(&self.write_lock, self.collection.as_str())?;
        let mut references = self.load_all(tenant)?;
        let changed = references
            .iter_mut()
            .filter(|r| &r.tenant_id == tenant)
            .map(|r| r.reassign(old, new))
            .filter(|changed| *changed)
            .count();
        if changed > 0 {
            write_json(&self.collection_path(tenant), &references)?;
        }
        Ok(changed)
    }
}
