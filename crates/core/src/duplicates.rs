//! Duplicate detection.
//!
//! The detector runs one exact-match pass per [`MatchKey`] (phone, then email, then name and
//! date of birth), hydrates each candidate bucket through the store and keeps the first group
//! seen for any given member set. Groups that only partially overlap are reported separately;
//! no transitive closure is computed.

use crate::error::PatientResult;
use crate::identity::{PatientId, TenantId};
use crate::patient::PatientSummary;
use crate::store::{MatchKey, PatientStore};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Two or more patients in one tenant believed to be the same person.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    pub matched_on: MatchKey,
    pub match_key: String,
    pub patients: Vec<PatientSummary>,
}

impl DuplicateGroup {
    /// Sorted member ids joined with commas.
    pub fn member_key(&self) -> String {
        member_key(self.patients.iter().map(|p| &p.id))
    }
}

fn member_key<'a>(ids: impl Iterator<Item = &'a PatientId>) -> String {
    let mut ids: Vec<String> = ids.map(|id| id.to_string()).collect();
    ids.sort();
    ids.join(",")
}

/// Contact details of a prospective patient.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateProbe {
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default)]
    pub emails: Vec<String>,
}

impl DuplicateProbe {
    pub fn is_empty(&self) -> bool {
        self.phones.iter().all(|p| p.trim().is_empty())
            && self.emails.iter().all(|e| e.trim().is_empty())
    }
}

#[derive(Clone)]
pub struct DuplicateDetector {
    patients: Arc<dyn PatientStore>,
}

impl DuplicateDetector {
    pub fn new(patients: Arc<dyn PatientStore>) -> Self {
        Self { patients }
    }

    /// Scans one tenant for duplicate groups.
    ///
    /// Any store failure aborts the whole scan.
    pub fn scan(&self, tenant: &TenantId) -> PatientResult<Vec<DuplicateGroup>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut groups = Vec::new();

        for key in MatchKey::ALL {
            let candidates = self.patients.aggregate_duplicate_candidates(tenant, key)?;
            let mut kept = 0usize;

            for candidate in candidates {
                let records = self.patients.find_many(tenant, &candidate.member_ids)?;
                if records.len() < 2 {
                    continue;
                }

                let group = DuplicateGroup {
                    matched_on: key,
                    match_key: candidate.key,
                    patients: records.iter().map(|r| r.summary()).collect(),
                };
                if seen.insert(group.member_key()) {
                    groups.push(group);
                    kept += 1;
                }
            }

            tracing::debug!(tenant = %tenant, pass = %key, groups = kept, "duplicate pass complete");
        }

        Ok(groups)
    }

    /// Active patients sharing any probe phone number or email address, in first-match order.
    pub fn find_matches(
        &self,
        tenant: &TenantId,
        probe: &DuplicateProbe,
    ) -> PatientResult<Vec<PatientSummary>> {
        let mut seen: HashSet<PatientId> = HashSet::new();
        let mut matches = Vec::new();

        for phone in probe.phones.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
            for record in self.patients.find_by_phone(tenant, phone)? {
                if seen.insert(record.id.clone()) {
                    matches.push(record.summary());
                }
            }
        }
        for email in probe.emails.iter().map(|e| e.trim()).filter(|e| !e.is_empty()) {
            for record in self.patients.find_by_email(tenant, email)? {
                if seen.insert(record.id.clone()) {
                    matches.push(record.summary());
                }
            }
        }

        Ok(matches)
    }
}
