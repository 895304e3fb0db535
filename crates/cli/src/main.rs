use anyhow::Context;
use clap::{Parser, Subcommand};
use molar_core::{
    patient_data_dir_from_env_value, ActorId, CoreConfig, MergeCoordinator, MergeRequest,
    PatientId, PatientRecord, StorageBackend, StoreSet, TenantId, TracingEventPublisher,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "molar")]
#[command(about = "Molar patient merge and duplicate detection CLI")]
struct Cli {
    /// Patient data directory (defaults to PATIENT_DATA_DIR, then ./patient_data)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import patients from a JSON array of patient documents
    Import {
        #[arg(long)]
        tenant: String,
        /// Path to the JSON file
        file: PathBuf,
    },
    /// Print one patient document
    Show {
        #[arg(long)]
        tenant: String,
        /// Patient UUID
        id: String,
    },
    /// List duplicate groups in a tenant
    Duplicates {
        #[arg(long)]
        tenant: String,
    },
    /// Merge DUPLICATE into MASTER
    Merge {
        #[arg(long)]
        tenant: String,
        /// Acting user recorded on both records
        #[arg(long, default_value = "system")]
        actor: String,
        /// Surviving patient UUID
        master: String,
        /// Patient UUID to archive
        duplicate: String,
    },
}

/// Builds a storable record from an imported JSON object.
///
/// The tenant always comes from the command line. Missing `id`, `createdAt` and `updatedAt`
/// are filled in.
fn prepare_import(
    mut value: serde_json::Value,
    tenant: &TenantId,
) -> anyhow::Result<PatientRecord> {
    let obj = value
        .as_object_mut()
        .context("each imported patient must be a JSON object")?;

    obj.insert("tenantId".into(), serde_json::json!(tenant.as_str()));
    if !obj.contains_key("id") {
        obj.insert("id".into(), serde_json::json!(PatientId::new().to_string()));
    }
    let now = serde_json::json!(chrono::Utc::now());
    obj.entry("createdAt").or_insert_with(|| now.clone());
    obj.entry("updatedAt").or_insert(now);

    Ok(serde_json::from_value(value)?)
}

fn import(stores: &StoreSet, tenant: &TenantId, file: &Path) -> anyhow::Result<usize> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let values: Vec<serde_json::Value> =
        serde_json::from_str(&contents).context("import file must hold a JSON array")?;

    let mut imported = 0;
    for (index, value) in values.into_iter().enumerate() {
        let record =
            prepare_import(value, tenant).with_context(|| format!("patient #{index} is invalid"))?;
        let stored = stores.patients.insert(record)?;
        println!("Imported patient: {}", stored.id);
        imported += 1;
    }
    Ok(imported)
}

fn run(data_dir: PathBuf, command: Commands) -> anyhow::Result<()> {
    let cfg = CoreConfig::new(data_dir, StorageBackend::File)?;
    let stores = StoreSet::open(&cfg)?;
    let coordinator = MergeCoordinator::from_stores(&stores, Arc::new(TracingEventPublisher));

    match command {
        Commands::Import { tenant, file } => {
            let tenant = TenantId::new(tenant)?;
            let count = import(&stores, &tenant, &file)?;
            println!("Imported {count} patients into {tenant}");
        }
        Commands::Show { tenant, id } => {
            let tenant = TenantId::new(tenant)?;
            let id = PatientId::parse(&id)?;
            let record = coordinator.patient(&tenant, &id)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Duplicates { tenant } => {
            let tenant = TenantId::new(tenant)?;
            let groups = coordinator.find_duplicates(&tenant)?;
            if groups.is_empty() {
                println!("No duplicates found.");
            }
            for group in groups {
                println!("[{}] {}", group.matched_on, group.match_key);
                for patient in group.patients {
                    println!(
                        "  ID: {}, Name: {} {}, DOB: {}",
                        patient.id, patient.first_name, patient.last_name, patient.date_of_birth
                    );
                }
            }
        }
        Commands::Merge {
            tenant,
            actor,
            master,
            duplicate,
        } => {
            let tenant = TenantId::new(tenant)?;
            let actor = ActorId::new(actor)?;
            let request = MergeRequest::parse(&master, &duplicate)?;
            let merged = coordinator.merge(&request, &tenant, &actor)?;
            println!(
                "Merged {} into {} (version {})",
                request.duplicate_id, merged.id, merged.version
            );
        }
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("molar_core=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let data_dir = cli
        .data_dir
        .unwrap_or_else(|| patient_data_dir_from_env_value(std::env::var("PATIENT_DATA_DIR").ok()));

    match cli.command {
        Some(command) => run(data_dir, command),
        None => {
            println!("Use 'molar --help' for commands");
            Ok(())
        }
    }
}
