//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own, without loading a `.env` file. The workspace's main
//! `molar-run` binary serves the same router after loading `.env`.
//!
//! ## Environment Variables
//! - `MOLAR_REST_ADDR`: server address (default: "0.0.0.0:3000")
//! - `PATIENT_DATA_DIR`: patient data directory (default: "patient_data")
//! - `STORAGE_BACKEND`: `file` or `memory` (default: "file")
//! - `API_KEY`: when set, every patient route requires a matching `x-api-key` header

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, DEFAULT_REST_ADDR};
use molar_core::{patient_data_dir_from_env_value, storage_backend_from_env_value, CoreConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("molar_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("MOLAR_REST_ADDR").unwrap_or_else(|_| DEFAULT_REST_ADDR.into());

    let cfg = CoreConfig::new(
        patient_data_dir_from_env_value(std::env::var("PATIENT_DATA_DIR").ok()),
        storage_backend_from_env_value(std::env::var("STORAGE_BACKEND").ok())?,
    )?;

    tracing::info!(
        "-- Starting Molar REST API on {} ({} storage at {})",
        addr,
        cfg.storage_backend(),
        cfg.patient_data_dir().display()
    );

    let state = AppState::from_config(&cfg, std::env::var("API_KEY").ok())?;
    api_rest::serve(&addr, state).await
}
