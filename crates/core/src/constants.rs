//! Constants used throughout the Molar core crate.
//!
//! Path and filename constants live here so the file store and its tests agree on layout.

/// Default directory for patient data storage when no explicit directory is configured.
pub const DEFAULT_PATIENT_DATA_DIR: &str = "patient_data";

/// Per-tenant directory holding sharded patient documents.
pub const PATIENTS_DIR_NAME: &str = "patients";

/// Filename for a stored patient document.
pub const PATIENT_JSON_FILENAME: &str = "patient.json";

/// Per-tenant file holding relationship documents.
pub const RELATIONSHIPS_FILENAME: &str = "relationships.json";

/// Per-tenant file holding timeline event documents.
pub const TIMELINE_FILENAME: &str = "timeline.json";

/// Actor recorded when a mutation has no authenticated user.
pub const SYSTEM_ACTOR: &str = "system";

/// Event name published after a successful merge.
pub const PATIENT_MERGED_EVENT: &str = "patient.merged";

/// Number of leading first-name characters compared by the name+DOB duplicate pass.
pub const FIRST_NAME_PREFIX_LEN: usize = 3;
