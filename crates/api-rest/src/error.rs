use api_shared::auth::AuthError;
use api_shared::wire::ErrorRes;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use molar_core::{ErrorKind, PatientError};

/// Everything a handler can fail with.
#[derive(Debug)]
pub enum ApiError {
    Patient(PatientError),
    Unauthorized(AuthError),
    BadRequest(String),
}

impl From<PatientError> for ApiError {
    fn from(e: PatientError) -> Self {
        ApiError::Patient(e)
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Unauthorized(e)
    }
}

pub(crate) fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Patient(e) => {
                let kind = e.kind();
                let message = if kind == ErrorKind::Internal {
                    tracing::error!("Internal error: {:?}", e);
                    "Internal error".to_string()
                } else {
                    e.to_string()
                };
                (status_for(kind), ErrorRes::new(kind.as_str(), message))
            }
            ApiError::Unauthorized(e) => (
                StatusCode::UNAUTHORIZED,
                ErrorRes::new("unauthorized", e.to_string()),
            ),
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorRes::new(ErrorKind::Validation.as_str(), message),
            ),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use molar_core::PatientId;

    fn status(e: PatientError) -> StatusCode {
        ApiError::from(e).into_response().status()
    }

    #[test]
    fn test_error_kinds_map_to_statuses() {
        assert_eq!(status(PatientError::SelfMerge), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(PatientError::InvalidInput("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(PatientError::NotFound {
                id: PatientId::new()
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(PatientError::VersionConflict {
                id: PatientId::new(),
                expected: 1,
                actual: 2,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(PatientError::LockPoisoned("patients")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_auth_errors_are_unauthorized() {
        let res = ApiError::from(AuthError::Invalid).into_response();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
