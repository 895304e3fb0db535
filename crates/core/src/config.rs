//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services.
//! Request handling never reads process-wide environment variables.

use crate::constants::DEFAULT_PATIENT_DATA_DIR;
use crate::{PatientError, PatientResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which store implementation a process runs against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StorageBackend {
    /// Lock-guarded maps; contents are lost on exit.
    Memory,
    /// Sharded JSON documents under `patient_data_dir`.
    #[default]
    File,
}

impl StorageBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageBackend::Memory => "memory",
            StorageBackend::File => "file",
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageBackend {
    type Err = PatientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "file" => Ok(StorageBackend::File),
            other => Err(PatientError::InvalidInput(format!(
                "unknown storage backend '{other}' (expected 'file' or 'memory')"
            ))),
        }
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    patient_data_dir: PathBuf,
    storage_backend: StorageBackend,
}

impl CoreConfig {
    pub fn new(patient_data_dir: PathBuf, storage_backend: StorageBackend) -> PatientResult<Self> {
        if patient_data_dir.as_os_str().is_empty() {
            return Err(PatientError::InvalidInput(
                "patient_data_dir cannot be empty".into(),
            ));
        }

        Ok(Self {
            patient_data_dir,
            storage_backend,
        })
    }

    pub fn patient_data_dir(&self) -> &Path {
        &self.patient_data_dir
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.storage_backend
    }
}

/// Parse the storage backend from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns [`StorageBackend::File`].
pub fn storage_backend_from_env_value(value: Option<String>) -> PatientResult<StorageBackend> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let parsed = value.map(|v| v.parse::<StorageBackend>()).transpose()?;

    Ok(parsed.unwrap_or_default())
}

/// Resolve the patient data directory from an optional string value.
pub fn patient_data_dir_from_env_value(value: Option<String>) -> PathBuf {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PATIENT_DATA_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_backend_defaults_to_file() {
        assert_eq!(
            storage_backend_from_env_value(None).unwrap(),
            StorageBackend::File
        );
        assert_eq!(
            storage_backend_from_env_value(Some("   ".into())).unwrap(),
            StorageBackend::File
        );
    }

    #[test]
    fn test_storage_backend_parses_case_insensitively() {
        assert_eq!(
            storage_backend_from_env_value(Some(" Memory ".into())).unwrap(),
            StorageBackend::Memory
        );
    }

    #[test]
    fn test_storage_backend_rejects_unknown_values() {
        let err = storage_backend_from_env_value(Some("postgres".into()))
            .expect_err("unknown backend should fail");
        assert!(matches!(err, PatientError::InvalidInput(_)));
    }

    #[test]
    fn test_patient_data_dir_default() {
        assert_eq!(
            patient_data_dir_from_env_value(None),
            PathBuf::from("patient_data")
        );
        assert_eq!(
            patient_data_dir_from_env_value(Some("/srv/molar".into())),
            PathBuf::from("/srv/molar")
        );
    }

    #[test]
    fn test_core_config_rejects_empty_dir() {
        assert!(CoreConfig::new(PathBuf::new(), StorageBackend::File).is_err());
        let cfg = CoreConfig::new(PathBuf::from("data"), StorageBackend::Memory).unwrap();
        assert_eq!(cfg.storage_backend(), StorageBackend::Memory);
        assert_eq!(cfg.patient_data_dir(), Path::new("data"));
    }
}
