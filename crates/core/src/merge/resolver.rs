//! Pure combination of a master and a duplicate patient.
//!
//! Master wins; the duplicate only fills gaps. Only contacts, the flat medical summary, tags
//! and notes are consolidated. Identity, person, consent and extension fields stay exactly as
//! stored on the master, so a duplicate can never replace a verified consent record.

use crate::patient::{Address, Contacts, Email, MedicalSummary, PatientRecord, Phone};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::hash::Hash;

/// Field values the merged master should hold.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedFields {
    pub contacts: Contacts,
    pub medical_summary: MedicalSummary,
    pub tags: Vec<String>,
    pub notes: String,
}

impl MergedFields {
    /// The fields as currently stored on `record`.
    pub fn from_record(record: &PatientRecord) -> Self {
        Self {
            contacts: record.contacts.clone(),
            medical_summary: record.medical_summary.clone(),
            tags: record.tags.clone(),
            notes: record.notes.clone(),
        }
    }

    /// Writes the merged values onto `record`, leaving every other field alone.
    pub fn apply_to(&self, record: &mut PatientRecord) {
        record.contacts = self.contacts.clone();
        record.medical_summary = self.medical_summary.clone();
        record.tags = self.tags.clone();
        record.notes = self.notes.clone();
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MergeResolver;

impl MergeResolver {
    pub fn combine(master: &PatientRecord, duplicate: &PatientRecord) -> MergedFields {
        MergedFields {
            contacts: Contacts {
                phones: append_missing(
                    &master.contacts.phones,
                    &duplicate.contacts.phones,
                    |p: &Phone| p.number.clone(),
                ),
                emails: append_missing(
                    &master.contacts.emails,
                    &duplicate.contacts.emails,
                    |e: &Email| e.address.clone(),
                ),
                addresses: append_missing(
                    &master.contacts.addresses,
                    &duplicate.contacts.addresses,
                    |a: &Address| (a.street.clone(), a.city.clone()),
                ),
            },
            medical_summary: MedicalSummary {
                allergies: set_union(
                    &master.medical_summary.allergies,
                    &duplicate.medical_summary.allergies,
                ),
                medications: set_union(
                    &master.medical_summary.medications,
                    &duplicate.medical_summary.medications,
                ),
                conditions: set_union(
                    &master.medical_summary.conditions,
                    &duplicate.medical_summary.conditions,
                ),
                flags: set_union(&master.medical_summary.flags, &duplicate.medical_summary.flags),
            },
            tags: set_union(&master.tags, &duplicate.tags),
            notes: merge_notes(&master.notes, &duplicate.notes, &duplicate.id.to_string()),
        }
    }
}

/// Master entries in their original order, then duplicate entries whose key is new.
fn append_missing<T, K, F>(master: &[T], duplicate: &[T], key: F) -> Vec<T>
where
    T: Clone,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen: HashSet<K> = master.iter().map(&key).collect();
    let mut merged = master.to_vec();
    for item in duplicate {
        if seen.insert(key(item)) {
            merged.push(item.clone());
        }
    }
    merged
}

/// Sorted, de-duplicated union of two string lists.
fn set_union(master: &[String], duplicate: &[String]) -> Vec<String> {
    master
        .iter()
        .chain(duplicate)
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub(crate) fn merge_separator(duplicate_id: &str) -> String {
    format!("--- Merged from patient {duplicate_id} ---")
}

fn merge_notes(master: &str, duplicate: &str, duplicate_id: &str) -> String {
    if duplicate.trim().is_empty() {
        return master.to_string();
    }
    if master.trim().is_empty() {
        return duplicate.to_string();
    }

    let block = format!("{}\n{}", merge_separator(duplicate_id), duplicate);
    // Already folded in by an earlier attempt of the same merge.
    if master.trim() == duplicate.trim() || master.contains(&block) {
        return master.to_string();
    }

    format!("{master}\n\n{block}")
}
