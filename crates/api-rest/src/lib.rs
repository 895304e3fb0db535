//! # API REST
//!
//! REST API implementation for Molar.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, request headers)
//!
//! Uses `api-shared` for wire types and utilities and `molar-core` for the domain.

#![warn(rust_2018_idioms)]

pub mod context;
pub mod error;

use axum::{
    extract::{rejection::JsonRejection, Path as AxumPath, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use api_shared::{wire, HealthService};
use context::RequestContext;
use error::ApiError;
use molar_core::{
    parse_patient_id, CoreConfig, DuplicateGroup, DuplicateProbe, MergeCoordinator, MergeRequest,
    PatientError, PatientRecord, PatientResult, PatientSummary, StoreSet, TracingEventPublisher,
};

pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";

/// Application state shared by all request handlers.
#[derive(Clone)]
pub struct AppState {
    coordinator: Arc<MergeCoordinator>,
    api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(coordinator: MergeCoordinator, api_key: Option<String>) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            api_key: api_key
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .map(Arc::from),
        }
    }

    /// Opens the configured stores and publishes events through `tracing`.
    pub fn from_config(cfg: &CoreConfig, api_key: Option<String>) -> PatientResult<Self> {
        let stores = StoreSet::open(cfg)?;
        let coordinator = MergeCoordinator::from_stores(&stores, Arc::new(TracingEventPublisher));
        Ok(Self::new(coordinator, api_key))
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(health, merge_patients, search_duplicates, check_duplicates, get_patient),
    components(schemas(
        wire::HealthRes,
        wire::MergePatientsReq,
        wire::MergePatientsRes,
        wire::PatientRes,
        wire::PatientSummary,
        wire::DuplicateGroup,
        wire::DuplicateSearchRes,
        wire::DuplicateCheckRes,
        wire::ErrorDetail,
        wire::ErrorRes,
    ))
)]
pub struct ApiDoc;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/patients/merge", post(merge_patients))
        .route("/patients/duplicates/search", get(search_duplicates))
        .route("/patients/duplicates/check", get(check_duplicates))
        .route("/patients/:id", get(get_patient))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds `addr` and serves the router until the process stops.
pub async fn serve(addr: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn record_json(record: &PatientRecord) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(record).map_err(|e| ApiError::from(PatientError::Serialization(e)))
}

fn summary_to_wire(summary: PatientSummary) -> wire::PatientSummary {
    wire::PatientSummary {
        id: summary.id.to_string(),
        patient_number: summary.patient_number,
        first_name: summary.first_name,
        last_name: summary.last_name,
        date_of_birth: summary.date_of_birth.to_string(),
        phones: summary.phones,
        emails: summary.emails,
        status: summary.status.as_str().to_string(),
        updated_at: summary.updated_at.to_rfc3339(),
    }
}

fn group_to_wire(group: DuplicateGroup) -> wire::DuplicateGroup {
    wire::DuplicateGroup {
        matched_on: group.matched_on.as_str().to_string(),
        match_key: group.match_key,
        patients: group.patients.into_iter().map(summary_to_wire).collect(),
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = wire::HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Used for monitoring and load balancer health checks. Needs no tenant or API key.
async fn health(State(_state): State<AppState>) -> Json<wire::HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    post,
    path = "/patients/merge",
    request_body = wire::MergePatientsReq,
    params(
        ("x-tenant-id" = String, Header, description = "Tenant the patients belong to"),
        ("x-user-id" = Option<String>, Header, description = "Acting user, defaults to `system`")
    ),
    responses(
        (status = 200, description = "Patients merged", body = wire::MergePatientsRes),
        (status = 400, description = "Self-merge, malformed ids or missing tenant", body = wire::ErrorRes),
        (status = 401, description = "Missing or invalid API key", body = wire::ErrorRes),
        (status = 404, description = "Patient not found", body = wire::ErrorRes),
        (status = 409, description = "Patient changed concurrently, retry", body = wire::ErrorRes),
        (status = 500, description = "Internal server error", body = wire::ErrorRes)
    )
)]
/// Merge a duplicate patient into a master patient
///
/// The master keeps its identity and gains the duplicate's contacts, medical summary, tags
/// and notes. The duplicate is archived and its references are repointed to the master.
///
/// # Errors
/// - `400` if the ids are equal or malformed
/// - `404` if either patient is missing, deleted or belongs to another tenant
/// - `409` if either patient changed while the merge was running
#[axum::debug_handler(state = AppState)]
async fn merge_patients(
    State(state): State<AppState>,
    ctx: RequestContext,
    payload: Result<Json<wire::MergePatientsReq>, JsonRejection>,
) -> Result<Json<wire::MergePatientsRes>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let request = MergeRequest::parse(&req.master_id, &req.duplicate_id)?;

    let merged = state.coordinator.merge(&request, &ctx.tenant, &ctx.actor)?;

    Ok(Json(wire::MergePatientsRes {
        success: true,
        data: record_json(&merged)?,
        message: "Patients merged successfully".into(),
    }))
}

#[utoipa::path(
    get,
    path = "/patients/duplicates/search",
    params(
        ("x-tenant-id" = String, Header, description = "Tenant to scan")
    ),
    responses(
        (status = 200, description = "Duplicate groups", body = wire::DuplicateSearchRes),
        (status = 400, description = "Missing tenant", body = wire::ErrorRes),
        (status = 500, description = "Internal server error", body = wire::ErrorRes)
    )
)]
/// Scan the tenant for groups of likely duplicate patients
///
/// Groups are found by exact phone, exact email, and last name plus first-name prefix plus
/// date of birth, in that order.
#[axum::debug_handler(state = AppState)]
async fn search_duplicates(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<wire::DuplicateSearchRes>, ApiError> {
    let groups: Vec<wire::DuplicateGroup> = state
        .coordinator
        .find_duplicates(&ctx.tenant)?
        .into_iter()
        .map(group_to_wire)
        .collect();

    Ok(Json(wire::DuplicateSearchRes {
        success: true,
        count: groups.len(),
        data: groups,
    }))
}

#[utoipa::path(
    get,
    path = "/patients/duplicates/check",
    params(
        wire::DuplicateCheckQuery,
        ("x-tenant-id" = String, Header, description = "Tenant to search")
    ),
    responses(
        (status = 200, description = "Existing patients with the same contact details", body = wire::DuplicateCheckRes),
        (status = 400, description = "Missing tenant", body = wire::ErrorRes),
        (status = 500, description = "Internal server error", body = wire::ErrorRes)
    )
)]
/// Check a prospective patient's phone or email against existing patients
#[axum::debug_handler(state = AppState)]
async fn check_duplicates(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<wire::DuplicateCheckQuery>,
) -> Result<Json<wire::DuplicateCheckRes>, ApiError> {
    let probe = DuplicateProbe {
        phones: query.phone.into_iter().collect(),
        emails: query.email.into_iter().collect(),
    };
    if probe.is_empty() {
        return Err(ApiError::BadRequest(
            "at least one of phone or email is required".into(),
        ));
    }

    let matches: Vec<wire::PatientSummary> = state
        .coordinator
        .find_matches(&ctx.tenant, &probe)?
        .into_iter()
        .map(summary_to_wire)
        .collect();

    Ok(Json(wire::DuplicateCheckRes {
        success: true,
        count: matches.len(),
        data: matches,
    }))
}

#[utoipa::path(
    get,
    path = "/patients/{id}",
    params(
        ("id" = String, Path, description = "Patient id"),
        ("x-tenant-id" = String, Header, description = "Tenant the patient belongs to")
    ),
    responses(
        (status = 200, description = "Patient document", body = wire::PatientRes),
        (status = 400, description = "Malformed id or missing tenant", body = wire::ErrorRes),
        (status = 404, description = "Patient not found", body = wire::ErrorRes)
    )
)]
/// Read a single live patient document
#[axum::debug_handler(state = AppState)]
async fn get_patient(
    State(state): State<AppState>,
    ctx: RequestContext,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<wire::PatientRes>, ApiError> {
    let id = parse_patient_id("id", &id)?;
    let record = state.coordinator.patient(&ctx.tenant, &id)?;

    Ok(Json(wire::PatientRes {
        success: true,
        data: record_json(&record)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use chrono::NaiveDate;
    use http_body_util::BodyExt;
    use molar_core::patient::{PersonInfo, Phone};
    use molar_core::{MemoryEventPublisher, TenantId};
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        stores: StoreSet,
    }

    fn app(api_key: Option<&str>) -> TestApp {
        let stores = StoreSet::in_memory();
        let coordinator =
            MergeCoordinator::from_stores(&stores, Arc::new(MemoryEventPublisher::new()));
        TestApp {
            router: router(AppState::new(coordinator, api_key.map(String::from))),
            stores,
        }
    }

    fn seed(stores: &StoreSet, tenant: &str, first: &str, phone: &str) -> PatientRecord {
        let mut record = PatientRecord::new(
            TenantId::new(tenant).unwrap(),
            "org-1",
            PersonInfo {
                first_name: first.into(),
                last_name: "Stoica".into(),
                middle_name: None,
                date_of_birth: NaiveDate::from_ymd_opt(1999, 12, 1).unwrap(),
                gender: None,
            },
        );
        record.contacts.phones.push(Phone {
            kind: "mobile".into(),
            number: phone.into(),
            is_primary: true,
            is_active: true,
        });
        stores.patients.insert(record).expect("seed patient")
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let res = router.clone().oneshot(req).await.expect("request");
        let status = res.status();
        let bytes = res.into_body().collect().await.expect("body").to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn merge_req(tenant: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/patients/merge")
            .header("content-type", "application/json")
            .header("x-user-id", "dr-pop");
        if let Some(tenant) = tenant {
            builder = builder.header("x-tenant-id", tenant);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_req(uri: &str, tenant: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("x-tenant-id", tenant)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(None);
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let (status, json) = send(&app.router, req).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ok"], true);
    }

    #[tokio::test]
    async fn test_merge_success() {
        let app = app(None);
        let master = seed(&app.stores, "t1", "Ilie", "0730");
        let duplicate = seed(&app.stores, "t1", "Ilie", "0731");

        let (status, json) = send(
            &app.router,
            merge_req(
                Some("t1"),
                serde_json::json!({
                    "masterId": master.id.to_string(),
                    "duplicateId": duplicate.id.to_string(),
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["version"], 2);
        assert_eq!(json["data"]["updatedBy"], "dr-pop");
        assert_eq!(json["data"]["contacts"]["phones"].as_array().unwrap().len(), 2);

        let (status, json) = send(
            &app.router,
            get_req(&format!("/patients/{}", duplicate.id), "t1"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_self_merge_is_bad_request() {
        let app = app(None);
        let id = molar_core::PatientId::new().to_string();

        let (status, json) = send(
            &app.router,
            merge_req(Some("t1"), serde_json::json!({ "masterId": id, "duplicateId": id })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["kind"], "validation");
    }

    #[tokio::test]
    async fn test_malformed_ids_and_bodies_are_bad_requests() {
        let app = app(None);

        let (status, _) = send(
            &app.router,
            merge_req(
                Some("t1"),
                serde_json::json!({ "masterId": "abc", "duplicateId": "def" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = send(
            &app.router,
            merge_req(Some("t1"), serde_json::json!({ "masterId": 7 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["kind"], "validation");
    }

    #[tokio::test]
    async fn test_missing_tenant_is_bad_request() {
        let app = app(None);
        let (status, json) = send(
            &app.router,
            merge_req(None, serde_json::json!({ "masterId": "a", "duplicateId": "b" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("x-tenant-id"));
    }

    #[tokio::test]
    async fn test_other_tenant_patients_are_not_found() {
        let app = app(None);
        let master = seed(&app.stores, "t1", "Ilie", "0730");
        let duplicate = seed(&app.stores, "t1", "Ilie", "0731");

        let (status, _) = send(
            &app.router,
            merge_req(
                Some("t2"),
                serde_json::json!({
                    "masterId": master.id.to_string(),
                    "duplicateId": duplicate.id.to_string(),
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_api_key_is_enforced_when_configured() {
        let app = app(Some("s3cret"));

        let (status, json) = send(&app.router, get_req("/patients/duplicates/search", "t1")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["kind"], "unauthorized");

        let req = Request::builder()
            .uri("/patients/duplicates/search")
            .header("x-tenant-id", "t1")
            .header("x-api-key", "s3cret")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app.router, req).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_duplicate_search_and_check() {
        let app = app(None);
        seed(&app.stores, "t1", "Ilie", "0730");
        seed(&app.stores, "t1", "Vlad", "0730");
        seed(&app.stores, "t2", "Ilie", "0730");

        let (status, json) = send(&app.router, get_req("/patients/duplicates/search", "t1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 1);
        assert_eq!(json["data"][0]["matchedOn"], "phone");
        assert_eq!(json["data"][0]["matchKey"], "0730");
        assert_eq!(json["data"][0]["patients"].as_array().unwrap().len(), 2);

        let (status, json) = send(
            &app.router,
            get_req("/patients/duplicates/check?phone=0730", "t1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 2);

        let (status, _) = send(&app.router, get_req("/patients/duplicates/check", "t1")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_patient() {
        let app = app(None);
        let patient = seed(&app.stores, "t1", "Ilie", "0730");

        let (status, json) = send(
            &app.router,
            get_req(&format!("/patients/{}", patient.id), "t1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["person"]["firstName"], "Ilie");

        let (status, _) = send(&app.router, get_req("/patients/not-an-id", "t1")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_openapi_lists_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| p.as_str() == "/patients/merge"));
        assert!(paths.iter().any(|p| p.as_str() == "/patients/duplicates/search"));
    }
}
