//! Tenant, actor and patient identifiers.
//!
//! Every patient operation is scoped to exactly one [`TenantId`]. Stores take the tenant as an
//! explicit argument on every call, so there is no query path that can omit it.

use crate::error::PatientResult;
use molar_types::{IdentifierText, NonEmptyText};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical patient identifier.
pub type PatientId = molar_uuid::ShardableUuid;

/// Isolation boundary for patient data.
///
/// Tenant ids name storage directories, so they are restricted to path-safe characters and
/// folded to lowercase. `ClinicA` and `clinica` are the same tenant on every filesystem.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(IdentifierText);

impl TenantId {
    pub fn new(value: impl AsRef<str>) -> PatientResult<Self> {
        Ok(Self(IdentifierText::new(value.as_ref().to_ascii_lowercase())?))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl TryFrom<String> for TenantId {
    type Error = crate::PatientError;

    fn try_from(value: String) -> PatientResult<Self> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(tenant: TenantId) -> Self {
        tenant.as_str().to_owned()
    }
}

/// The user (or system process) performing a mutation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(NonEmptyText);

impl ActorId {
    pub fn new(value: impl AsRef<str>) -> PatientResult<Self> {
        Ok(Self(NonEmptyText::new(value)?))
    }

    /// Actor recorded for operations without an authenticated user.
    pub fn system() -> Self {
        Self(NonEmptyText::new(crate::constants::SYSTEM_ACTOR).expect("constant is non-empty"))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Parses an externally supplied patient id, naming the field in the error message.
pub fn parse_patient_id(field: &str, input: &str) -> PatientResult<PatientId> {
    PatientId::parse(input.trim()).map_err(|source| crate::PatientError::InvalidId {
        field: field.to_string(),
        source,
    })
}
