//! Patient identifier and sharded-path utilities.
//!
//! Molar stores patient documents under sharded directories derived from the patient UUID.
//!
//! To keep path derivation deterministic, patient identifiers use a *canonical* UUID
//! representation: **32 lowercase hexadecimal characters** (no hyphens).
//!
//! ## Canonical UUID form
//! - Length: 32
//! - Characters: `0-9` and `a-f` only
//! - Example: `550e8400e29b41d4a716446655440000`
//!
//! Canonical form is *required* for externally supplied identifiers (API bodies, CLI
//! arguments). Use [`ShardableUuid::parse`] to validate an input string. Uppercase,
//! hyphenated, wrong-length and non-hex values are rejected.
//!
//! ## Sharded directory layout
//! For a canonical UUID `u`, documents live under:
//! `parent_dir/<u[0..2]>/<u[2..4]>/<u>/`
//!
//! Example:
//! `patient_data/clinic-a/patients/55/0e/550e8400e29b41d4a716446655440000/`

mod service;

pub use service::{ShardableUuid, Uuid};

/// Error type for UUID operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for UUID operations.
pub type UuidResult<T> = Result<T, UuidError>;
