//! Patient document model.
//!
//! This is the subset of the stored patient document that merge and duplicate detection work
//! with. Fields owned by other parts of the system (insurance, communication preferences and
//! so on) are carried through untouched in [`PatientRecord::extra`].

use crate::identity::{ActorId, PatientId, TenantId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatientStatus {
    #[default]
    Active,
    Inactive,
    Archived,
    Deceased,
}

impl PatientStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PatientStatus::Active => "active",
            PatientStatus::Inactive => "inactive",
            PatientStatus::Archived => "archived",
            PatientStatus::Deceased => "deceased",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonInfo {
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    pub date_of_birth: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phone {
    #[serde(rename = "type")]
    pub kind: String,
    pub number: String,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Email {
    #[serde(rename = "type")]
    pub kind: String,
    pub address: String,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub is_verified: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contacts {
    #[serde(default)]
    pub phones: Vec<Phone>,
    #[serde(default)]
    pub emails: Vec<Email>,
    #[serde(default)]
    pub addresses: Vec<Address>,
}

/// Legacy flat medical summary.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalSummary {
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub medications: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub flags: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRecord {
    #[serde(default)]
    pub gdpr_consent: bool,
    #[serde(default)]
    pub marketing_consent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consent_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consent_version: Option<String>,
}

/// A stored patient document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    pub id: PatientId,
    pub tenant_id: TenantId,
    pub organization_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinic_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_number: Option<String>,

    pub person: PersonInfo,
    #[serde(default)]
    pub contacts: Contacts,
    #[serde(default)]
    pub medical_summary: MedicalSummary,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consent: Option<ConsentRecord>,

    #[serde(default)]
    pub status: PatientStatus,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<ActorId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<ActorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<ActorId>,

    #[serde(default = "initial_version")]
    pub version: u64,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PatientRecord {
    /// Builds a fresh, active record at version 1.
    pub fn new(
        tenant_id: TenantId,
        organization_id: impl Into<String>,
        person: PersonInfo,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PatientId::new(),
            tenant_id,
            organization_id: organization_id.into(),
            clinic_id: None,
            patient_number: None,
            person,
            contacts: Contacts::default(),
            medical_summary: MedicalSummary::default(),
            tags: Vec::new(),
            notes: String::new(),
            consent: None,
            status: PatientStatus::Active,
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
            created_at: now,
            updated_at: now,
            created_by: None,
            updated_by: None,
            version: initial_version(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }

    pub fn summary(&self) -> PatientSummary {
        PatientSummary::from(self)
    }
}

/// Lightweight view of a patient used in duplicate listings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSummary {
    pub id: PatientId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_number: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub phones: Vec<String>,
    pub emails: Vec<String>,
    pub status: PatientStatus,
    pub updated_at: DateTime<Utc>,
}

impl From<&PatientRecord> for PatientSummary {
    fn from(record: &PatientRecord) -> Self {
        Self {
            id: record.id.clone(),
            patient_number: record.patient_number.clone(),
            first_name: record.person.first_name.clone(),
            last_name: record.person.last_name.clone(),
            date_of_birth: record.person.date_of_birth,
            phones: record
                .contacts
                .phones
                .iter()
                .map(|p| p.number.clone())
                .collect(),
            emails: record
                .contacts
                .emails
                .iter()
                .map(|e| e.address.clone())
                .collect(),
            status: record.status,
            updated_at: record.updated_at,
        }
    }
}

fn default_true() -> bool {
    true
}

fn initial_version() -> u64 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> PersonInfo {
        PersonInfo {
            first_name: "Ana".into(),
            last_name: "Popescu".into(),
            middle_name: None,
            date_of_birth: NaiveDate::from_ymd_opt(1988, 4, 12).unwrap(),
            gender: None,
        }
    }

    #[test]
    fn test_new_record_is_active_at_version_one() {
        let record = PatientRecord::new(TenantId::new("t1").unwrap(), "org-1", person());

        assert!(record.is_active());
        assert_eq!(record.version, 1);
        assert_eq!(record.status, PatientStatus::Active);
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let mut record = PatientRecord::new(TenantId::new("t1").unwrap(), "org-1", person());
        record.extra.insert(
            "insurance".into(),
            serde_json::json!([{ "provider": "CASMB", "policyNumber": "P-1" }]),
        );

        let json = serde_json::to_value(&record).expect("serialise");
        assert_eq!(json["insurance"][0]["provider"], "CASMB");
        assert_eq!(json["person"]["dateOfBirth"], "1988-04-12");
        assert_eq!(json["status"], record.status.as_str());

        let back: PatientRecord = serde_json::from_value(json).expect("deserialise");
        assert_eq!(back, record);
    }

    #[test]
    fn test_phone_defaults() {
        let phone: Phone =
            serde_json::from_str(r#"{"type":"mobile","number":"0722"}"#).expect("phone");
        assert!(phone.is_active);
        assert!(!phone.is_primary);
    }
}
