use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use guardian_sync::config::AppConfig;
use guardian_sync::connectivity::{Connectivity, ConnectivityProbe};
use guardian_sync::constants::QUEUE_STORAGE_KEY;
use guardian_sync::coordinator::{SkipReason, SyncCoordinator, SyncOutcome};
use guardian_sync::credentials;
use guardian_sync::notify::SyncEvent;
use guardian_sync::queue::OfflineQueue;
use guardian_sync::record::RecordKind;
use guardian_sync::remote::RestSink;
use guardian_sync::serve::{router, ApiState};
use guardian_sync::storage::open_store;

type DynError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(author, version, about = "Offline write queue and sync for field safety records")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Save a record locally for a later sync
    Enqueue {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,

        /// Record kind
        #[arg(short, long, value_enum)]
        kind: RecordKind,

        /// Record payload as a JSON document
        #[arg(short, long, conflicts_with = "payload_file")]
        payload: Option<String>,

        /// Read the JSON payload from a file
        #[arg(long)]
        payload_file: Option<PathBuf>,
    },
    /// List queued records as JSON lines
    List {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,

        /// Only show records not yet synced
        #[arg(short, long)]
        unsynced: bool,
    },
    /// Run one sync cycle if the remote is reachable
    Sync {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Remove records that have already been synced
    Prune {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show local storage usage
    Usage {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run the sync coordinator with connectivity probing and the HTTP API
    Serve {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,

        /// Port to listen on (overrides config file)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

fn main() -> Result<(), DynError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let rt = tokio::runtime::Runtime::new()?;

    match args.command {
        Command::Enqueue {
            config,
            kind,
            payload,
            payload_file,
        } => rt.block_on(enqueue(&config, kind, payload, payload_file)),
        Command::List { config, unsynced } => rt.block_on(list(&config, unsynced)),
        Command::Sync { config } => rt.block_on(sync(&config)),
        Command::Prune { config } => rt.block_on(prune(&config)),
        Command::Usage { config } => rt.block_on(usage(&config)),
        Command::Serve { config, port } => rt.block_on(serve(&config, port)),
    }
}

async fn open_queue(config: &AppConfig) -> Result<Arc<OfflineQueue>, DynError> {
    let store = open_store(&config.storage)
        .await
        .map_err(|e| format!("Failed to open local storage: {}", e))?;
    Ok(Arc::new(OfflineQueue::with_options(
        store,
        QUEUE_STORAGE_KEY,
        config.storage_cap_bytes,
    )))
}

async fn build_coordinator(config: &AppConfig) -> Result<Arc<SyncCoordinator>, DynError> {
    let queue = open_queue(config).await?;

    let api_key = match &config.remote.credential_profile {
        Some(profile) => {
            let creds = credentials::load_credentials()?;
            Some(credentials::get_api_key(&creds, profile)?)
        }
        None => None,
    };
    let sink = RestSink::new(&config.remote.url, api_key, config.write_timeout())
        .map_err(|e| format!("Failed to create remote client: {}", e))?;

    Ok(Arc::new(SyncCoordinator::new(
        queue,
        Arc::new(sink),
        config.coordinator_options(),
    )))
}

fn print_event(event: &SyncEvent) {
    println!("{}: {}", event.title(), event.description());
}

async fn enqueue(
    config_path: &Path,
    kind: RecordKind,
    payload: Option<String>,
    payload_file: Option<PathBuf>,
) -> Result<(), DynError> {
    let config = AppConfig::load(config_path)?;

    let raw = match (payload, payload_file) {
        (Some(raw), None) => raw,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read payload file '{}': {}", path.display(), e))?,
        _ => return Err("Exactly one of --payload or --payload-file is required".into()),
    };
    let payload: serde_json::Value =
        serde_json::from_str(&raw).map_err(|e| format!("Payload is not valid JSON: {}", e))?;

    // Local only: a missing remote or credential must not block the write
    let queue = open_queue(&config).await?;
    let id = queue.enqueue(kind, payload).await?;

    println!("{}", id);
    print_event(&SyncEvent::StoredOffline { id, kind });
    Ok(())
}

async fn list(config_path: &Path, unsynced: bool) -> Result<(), DynError> {
    let config = AppConfig::load(config_path)?;
    let queue = open_queue(&config).await?;

    let records = if unsynced {
        queue.list_unsynced().await?
    } else {
        queue.list_all().await?
    };
    for record in &records {
        println!("{}", serde_json::to_string(record)?);
    }
    Ok(())
}

async fn sync(config_path: &Path) -> Result<(), DynError> {
    let config = AppConfig::load(config_path)?;
    let coordinator = build_coordinator(&config).await?;

    let probe = ConnectivityProbe::new(&config.remote.url, config.write_timeout())?;
    coordinator.set_online(probe.probe_once().await);
    coordinator.refresh_count().await?;

    match coordinator.sync_now().await? {
        SyncOutcome::Completed(report) => {
            println!(
                "Synced {} record(s), {} still pending",
                report.success_count, report.failure_count
            );
            for event in SyncEvent::from_report(&report) {
                print_event(&event);
            }
        }
        SyncOutcome::Skipped {
            reason: SkipReason::Offline,
        } => {
            println!(
                "Remote {} is unreachable; {} record(s) remain queued",
                config.remote.url,
                coordinator.status().unsynced_count
            );
        }
        SyncOutcome::Skipped {
            reason: SkipReason::AlreadySyncing,
        } => println!("A sync cycle is already running"),
    }
    Ok(())
}

async fn prune(config_path: &Path) -> Result<(), DynError> {
    let config = AppConfig::load(config_path)?;
    let queue = open_queue(&config).await?;
    let removed = queue.prune_synced().await?;
    println!("Removed {} synced record(s)", removed);
    Ok(())
}

async fn usage(config_path: &Path) -> Result<(), DynError> {
    let config = AppConfig::load(config_path)?;
    let queue = open_queue(&config).await?;
    let usage = queue.storage_usage().await?;
    println!(
        "{} bytes used ({:.2}% of {} bytes)",
        usage.used_bytes, usage.percentage_of_cap, config.storage_cap_bytes
    );
    Ok(())
}

async fn serve(config_path: &Path, port_override: Option<u16>) -> Result<(), DynError> {
    let config = AppConfig::load(config_path)?;
    let port = port_override.unwrap_or(config.api_port);
    let coordinator = build_coordinator(&config).await?;

    let probe = ConnectivityProbe::new(&config.remote.url, config.write_timeout())?;
    let connectivity = Connectivity::new(probe.probe_once().await);
    let handle = coordinator.start(&connectivity);
    let probe_task = probe.spawn(connectivity.clone(), config.probe_interval());

    let mut events = coordinator.subscribe_events();
    let event_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Dropped {} notification(s)", n)
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let state = Arc::new(ApiState {
        coordinator: coordinator.clone(),
        connectivity: connectivity.clone(),
    });
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .map_err(|e| format!("Failed to bind to port {}: {}", port, e))?;
    println!("Listening on: http://0.0.0.0:{}", port);
    println!(
        "Remote: {} ({})",
        config.remote.url,
        if connectivity.is_online() { "online" } else { "offline" }
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(|e| format!("Server error: {}", e))?;

    info!("Shutting down");
    probe_task.abort();
    handle.shutdown().await;
    event_task.abort();
    Ok(())
}
