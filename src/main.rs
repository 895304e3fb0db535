use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, DEFAULT_REST_ADDR};
use molar_core::{CoreConfig, patient_data_dir_from_env_value, storage_backend_from_env_value};

/// Main entry point for the Molar application
///
/// Loads `.env`, resolves configuration once and serves the REST API.
///
/// # Environment Variables
/// - `MOLAR_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `PATIENT_DATA_DIR`: Directory for patient data storage (default: "patient_data")
/// - `STORAGE_BACKEND`: `file` or `memory` (default: "file")
/// - `API_KEY`: API key required in `x-api-key` when set
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("molar_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("MOLAR_REST_ADDR").unwrap_or_else(|_| DEFAULT_REST_ADDR.into());

    let cfg = CoreConfig::new(
        patient_data_dir_from_env_value(std::env::var("PATIENT_DATA_DIR").ok()),
        storage_backend_from_env_value(std::env::var("STORAGE_BACKEND").ok())?,
    )?;

    tracing::info!("++ Starting Molar REST on {}", rest_addr);
    tracing::info!(
        "++ Using {} storage at {}",
        cfg.storage_backend(),
        cfg.patient_data_dir().display()
    );

    let state = AppState::from_config(&cfg, std::env::var("API_KEY").ok())?;
    api_rest::serve(&rest_addr, state).await
}
