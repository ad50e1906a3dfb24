#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::cast_possible_wrap,
    clippy::cast_possible_truncation,
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use filebridge::audit::AuditLog;
use filebridge::config::Config;
use filebridge::contacts::ContactResolver;
use filebridge::db::Store;
use filebridge::gateway::{self, AppState};
use filebridge::health;
use filebridge::session::{
    CloudProvider, Ingestor, NullProvider, SessionManager, SessionProvider,
};
use filebridge::storage::{RemoteStore, S3RemoteStore, StorageService};
use filebridge::transfer::TransferOrchestrator;

/// Filebridge - move files between a web UI and a messaging network.
#[derive(Parser, Debug)]
#[command(name = "filebridge")]
#[command(version)]
#[command(about = "WhatsApp file-transfer bridge", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the gateway and the messaging session
    Serve {
        /// Bind host (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Show a local summary of the store and configuration
    Status,
    /// Export the transfer journal as CSV
    Export {
        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { host, port } => serve(host, port).await,
        Commands::Status => status(),
        Commands::Export { output } => export(output),
    }
}

async fn serve(host_override: Option<String>, port_override: Option<u16>) -> Result<()> {
    let config = Config::load_or_init()?;
    let host = host_override.unwrap_or_else(|| config.gateway.host.clone());
    let port = port_override.unwrap_or(config.gateway.port);

    let store = Store::open(&config.db_path())?;
    health::mark_component_ok("database");

    let remote: Option<Arc<dyn RemoteStore>> = if config.remote_storage.enabled {
        let backend = S3RemoteStore::new(&config.remote_storage)
            .context("Failed to configure remote storage")?;
        tracing::info!(
            "Remote storage tier enabled (bucket '{}')",
            config.remote_storage.bucket
        );
        Some(Arc::new(backend))
    } else {
        None
    };
    let storage = Arc::new(StorageService::new(
        store.clone(),
        config.upload_dir(),
        config.storage.remote_threshold_bytes,
        remote,
    )?);
    health::mark_component_ok("storage");

    let contacts = Arc::new(ContactResolver::new(store.clone()));
    let audit = Arc::new(AuditLog::new(store.clone()));

    // Provider bindings keep their session material under this directory.
    std::fs::create_dir_all(config.session_data_dir())
        .context("Failed to create the session data directory")?;

    let (provider, cloud): (Arc<dyn SessionProvider>, Option<Arc<CloudProvider>>) =
        match config.session.provider.as_str() {
            "cloud" => {
                let cloud_config = config.session.cloud.clone().context(
                    "[session] provider = \"cloud\" requires a [session.cloud] section",
                )?;
                let cloud = Arc::new(CloudProvider::new(cloud_config));
                (cloud.clone(), Some(cloud))
            }
            _ => (Arc::new(NullProvider), None),
        };

    let session = SessionManager::new(
        provider,
        Ingestor::new(storage.clone(), contacts.clone(), audit.clone()),
    );

    // Bring the session up in the background; the API can trigger retries.
    {
        let session = session.clone();
        tokio::spawn(async move {
            match session.initialize().await {
                Ok(()) => health::mark_component_ok("session"),
                Err(err) => {
                    tracing::warn!("Session did not come up at boot: {err}");
                    health::mark_component_error("session", err);
                }
            }
        });
    }

    let transfer = Arc::new(TransferOrchestrator::new(
        storage.clone(),
        contacts.clone(),
        session.clone(),
        audit.clone(),
    ));

    let state = AppState {
        storage,
        contacts,
        session,
        transfer,
        audit,
        cloud,
        max_upload_bytes: config.storage.max_upload_bytes,
    };

    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}"))
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))?;
    let addr = listener.local_addr()?;

    println!("🌉 Filebridge gateway listening on http://{addr}");
    println!("  POST /api/files            — upload a file");
    println!("  POST /api/send             — fan a file out to contacts");
    println!("  GET  /api/logs/export      — transfer journal as CSV");
    println!("  GET  /api/session/status   — messaging session state");
    println!("  GET  /health               — liveness probe");
    println!("  Press Ctrl+C to stop.");
    health::mark_component_ok("gateway");

    axum::serve(listener, gateway::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Gateway server failed")?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Shutting down");
    }
}

fn status() -> Result<()> {
    let config = Config::load_or_init()?;
    let store = Store::open(&config.db_path())?;
    let stats = store.stats()?;

    println!("Config:    {}", config.config_path.display());
    println!("Database:  {}", config.db_path().display());
    println!("Uploads:   {}", config.upload_dir().display());
    println!(
        "Remote:    {}",
        if config.remote_storage.enabled {
            format!("enabled (bucket '{}')", config.remote_storage.bucket)
        } else {
            "disabled".into()
        }
    );
    println!("Session:   provider '{}'", config.session.provider);
    println!();
    println!("Artifacts: {}", stats.artifacts);
    println!("Contacts:  {}", stats.contacts);
    println!("Journal:   {} entries", stats.log_entries);
    Ok(())
}

fn export(output: Option<PathBuf>) -> Result<()> {
    let config = Config::load_or_init()?;
    let store = Store::open(&config.db_path())?;
    let csv = AuditLog::new(store)
        .export_csv()
        .map_err(|err| anyhow::anyhow!(err))?;

    match output {
        Some(path) => {
            std::fs::write(&path, csv)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote transfer journal to {}", path.display());
        }
        None => print!("{csv}"),
    }
    Ok(())
}
