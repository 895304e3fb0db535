//! JSON request and response bodies.
//!
//! Field names are camelCase on the wire. Full patient documents travel as free-form JSON
//! objects so that fields owned by other services pass through unchanged.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MergePatientsReq {
    /// Surviving patient.
    pub master_id: String,
    /// Patient folded into the master and archived.
    pub duplicate_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MergePatientsRes {
    pub success: bool,
    /// The merged master patient document.
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PatientRes {
    pub success: bool,
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatientSummary {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_number: Option<String>,
    pub first_name: String,
    pub last_name: String,
    /// ISO 8601 date.
    pub date_of_birth: String,
    pub phones: Vec<String>,
    pub emails: Vec<String>,
    pub status: String,
    /// RFC 3339 timestamp.
    pub updated_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    /// `phone`, `email` or `nameDob`.
    pub matched_on: String,
    pub match_key: String,
    pub patients: Vec<PatientSummary>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DuplicateSearchRes {
    pub success: bool,
    pub data: Vec<DuplicateGroup>,
    pub count: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DuplicateCheckQuery {
    /// Phone number to look for, matched exactly.
    pub phone: Option<String>,
    /// Email address to look for, matched exactly.
    pub email: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DuplicateCheckRes {
    pub success: bool,
    pub data: Vec<PatientSummary>,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// `validation`, `unauthorized`, `not_found`, `conflict` or `internal`.
    pub kind: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub success: bool,
    pub error: ErrorDetail,
}

impl ErrorRes {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                kind: kind.into(),
                message: message.into(),
            },
        }
    }
}
