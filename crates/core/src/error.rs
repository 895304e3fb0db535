use crate::PatientId;

#[derive(Debug, thiserror::Error)]
pub enum PatientError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{field} is not a valid patient id: {source}")]
    InvalidId {
        field: String,
        #[source]
        source: molar_uuid::UuidError,
    },
    #[error("invalid text: {0}")]
    InvalidText(#[from] molar_types::TextError),
    #[error("masterId and duplicateId must be different")]
    SelfMerge,

    #[error("patient {id} not found")]
    NotFound { id: PatientId },
    #[error("patient {id} already exists")]
    AlreadyExists { id: PatientId },
    #[error("patient {id} was modified concurrently (expected version {expected}, found {actual})")]
    VersionConflict {
        id: PatientId,
        expected: u64,
        actual: u64,
    },

    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to write patient file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read patient file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to serialize document: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize document: {0}")]
    Deserialization(serde_json::Error),
    #[error("store lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

/// Coarse classification used by API surfaces to choose a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Internal,
}

impl ErrorKind {
    /// Machine-readable name exposed to clients.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
        }
    }
}

impl PatientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PatientError::InvalidInput(_)
            | PatientError::InvalidId { .. }
            | PatientError::InvalidText(_)
            | PatientError::SelfMerge => ErrorKind::Validation,
            PatientError::NotFound { .. } => ErrorKind::NotFound,
            PatientError::AlreadyExists { .. } | PatientError::VersionConflict { .. } => {
                ErrorKind::Conflict
            }
            PatientError::StorageDirCreation(_)
            | PatientError::FileWrite(_)
            | PatientError::FileRead(_)
            | PatientError::Serialization(_)
            | PatientError::Deserialization(_)
            | PatientError::LockPoisoned(_) => ErrorKind::Internal,
        }
    }

    /// True when repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PatientError::VersionConflict { .. })
    }
}

pub type PatientResult<T> = std::result::Result<T, PatientError>;
