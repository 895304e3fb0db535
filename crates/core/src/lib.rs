//! # Molar Core
//!
//! Core business logic for patient duplicate detection and merge.
//!
//! This crate contains pure data operations and storage:
//! - Patient document model and tenant-scoped store traits
//! - In-memory and sharded-JSON store backends
//! - Duplicate detection across phone, email and name+date-of-birth
//! - Merge resolution and the multi-step merge coordinator
//! - Domain events published after a merge
//!
//! **No API concerns**: authentication, HTTP servers and request parsing belong in `api-rest`
//! and `api-shared`.

pub mod config;
pub mod constants;
pub mod duplicates;
pub mod error;
pub mod events;
pub mod identity;
pub mod merge;
pub mod patient;
pub mod store;

pub use config::{
    patient_data_dir_from_env_value, storage_backend_from_env_value, CoreConfig, StorageBackend,
};
pub use duplicates::{DuplicateDetector, DuplicateGroup, DuplicateProbe};
pub use error::{ErrorKind, PatientError, PatientResult};
pub use events::{
    DomainEvent, EventPublisher, MemoryEventPublisher, PatientMerged, TracingEventPublisher,
};
pub use identity::{parse_patient_id, ActorId, PatientId, TenantId};
pub use merge::{MergeCoordinator, MergeRequest, MergeResolver, MergedFields};
pub use patient::{PatientRecord, PatientStatus, PatientSummary};
pub use store::{
    MatchKey, PatientReference, PatientStore, ReferenceCollection, ReferenceStore, StoreSet,
};
