//! Quillvault CLI - run the sync service, drive sync cycles, mint tokens.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use quillvault_common::token::device_token;
use quillvault_server::{router, AppState};
use quillvault_store::LocalStore;
use quillvault_sync::{
    HttpRemote, NoPrompt, SyncEngine, SyncMode, SyncOutcome, SyncScheduler, SyncSettings,
    SyncSummary,
};
use quillvault_vault::LocalVault;

#[derive(Parser)]
#[command(name = "quillvault")]
#[command(about = "Quillvault - vault sync over a simple object store")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the manifest service over a local directory store.
    Serve {
        /// Directory holding the object store.
        #[arg(short, long)]
        root: PathBuf,

        /// Shared secret for device tokens.
        #[arg(short, long, env = "QUILLVAULT_SECRET")]
        secret: String,

        /// Address to listen on.
        #[arg(short, long, default_value = "127.0.0.1:8787")]
        bind: SocketAddr,

        /// Base URL presigned links are issued under (defaults to the bind
        /// address over http).
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Run one sync cycle.
    Sync {
        /// Path to the settings file.
        #[arg(short, long, default_value = "quillvault.json")]
        config: PathBuf,

        /// Vault directory to sync.
        #[arg(long)]
        vault: PathBuf,

        /// Ignore the stored base manifest and reconcile from scratch.
        #[arg(long)]
        full: bool,
    },

    /// Sync on the configured interval until interrupted.
    Watch {
        /// Path to the settings file.
        #[arg(short, long, default_value = "quillvault.json")]
        config: PathBuf,

        /// Vault directory to sync.
        #[arg(long)]
        vault: PathBuf,
    },

    /// Print the bearer token for a device.
    Token {
        /// Device identifier.
        #[arg(short, long)]
        device_id: String,

        /// Shared secret.
        #[arg(short, long, env = "QUILLVAULT_SECRET")]
        secret: String,
    },

    /// Write a starter settings file.
    Init {
        /// Where to write it.
        #[arg(short, long, default_value = "quillvault.json")]
        config: PathBuf,

        /// Manifest service endpoint.
        #[arg(short, long)]
        endpoint: String,

        /// Shared secret used to mint this device's token.
        #[arg(short, long, env = "QUILLVAULT_SECRET")]
        secret: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command {
        Commands::Serve {
            root,
            secret,
            bind,
            base_url,
        } => serve(root, &secret, bind, base_url).await,
        Commands::Sync {
            config,
            vault,
            full,
        } => sync_once(config, vault, full).await,
        Commands::Watch { config, vault } => watch(config, vault).await,
        Commands::Token { device_id, secret } => {
            println!("{}", device_token(&device_id, &secret));
            Ok(())
        }
        Commands::Init {
            config,
            endpoint,
            secret,
        } => init(config, endpoint, &secret).await,
    }
}

async fn serve(
    root: PathBuf,
    secret: &str,
    bind: SocketAddr,
    base_url: Option<String>,
) -> Result<()> {
    let store = LocalStore::new(&root).context("opening object store directory")?;
    let base_url = base_url.unwrap_or_else(|| format!("http://{bind}"));
    let state = AppState::new(Arc::new(store), secret, &base_url);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    info!(%bind, %base_url, root = %root.display(), "manifest service listening");

    axum::serve(listener, router(state))
        .await
        .context("serving")?;
    Ok(())
}

async fn build_engine(config: &PathBuf, vault_dir: PathBuf) -> Result<SyncEngine> {
    let settings = SyncSettings::load(config)
        .await
        .with_context(|| format!("loading settings from {}", config.display()))?;

    let vault = LocalVault::new(&vault_dir).context("opening vault directory")?;
    let state_path = vault_dir.join(".quillvault").join("state.json");
    let remote = HttpRemote::new(&settings.endpoint, &settings.token)
        .context("building remote client")?;

    let engine = SyncEngine::new(
        Arc::new(remote),
        Arc::new(vault),
        Arc::new(NoPrompt),
        &settings,
        state_path,
    )
    .await
    .context("initializing sync engine")?;
    Ok(engine)
}

async fn sync_once(config: PathBuf, vault_dir: PathBuf, full: bool) -> Result<()> {
    let engine = build_engine(&config, vault_dir).await?;

    match engine.sync(full).await {
        Ok(SyncOutcome::Completed(summary)) => {
            print_summary(&summary);
            Ok(())
        }
        Ok(SyncOutcome::Skipped) => {
            println!("sync already in progress");
            Ok(())
        }
        Err(err) => Err(anyhow::anyhow!("sync failed: {err}")),
    }
}

async fn watch(config: PathBuf, vault_dir: PathBuf) -> Result<()> {
    let settings = SyncSettings::load(&config)
        .await
        .with_context(|| format!("loading settings from {}", config.display()))?;
    let engine = Arc::new(build_engine(&config, vault_dir).await?);

    let mode = SyncMode::from_interval_secs(settings.sync_interval);
    if mode == SyncMode::Manual {
        anyhow::bail!("syncInterval is 0; nothing to watch (use `quillvault sync`)");
    }

    let (scheduler, handle) = SyncScheduler::new(mode);
    let runner = engine.clone();
    let loop_task = tokio::spawn(async move {
        handle
            .run(move |force_full| {
                let engine = runner.clone();
                async move { engine.sync(force_full).await }
            })
            .await;
    });

    // One cycle right away; after that the interval takes over.
    match scheduler.request_sync(false).await {
        Ok(SyncOutcome::Completed(summary)) => print_summary(&summary),
        Ok(SyncOutcome::Skipped) => {}
        Err(err) => eprintln!("sync failed: {err}"),
    }

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutting down");
    scheduler.shutdown().await;
    loop_task.await.context("scheduler task")?;
    Ok(())
}

async fn init(config: PathBuf, endpoint: String, secret: &str) -> Result<()> {
    if config.exists() {
        anyhow::bail!("{} already exists", config.display());
    }

    let device_id = uuid::Uuid::new_v4().to_string();
    let settings = SyncSettings {
        endpoint,
        token: device_token(&device_id, secret),
        device_id,
        sync_interval: 300,
        conflict_strategy: Default::default(),
        exclude_patterns: Vec::new(),
        sync_on_file_open: false,
    };
    settings.save(&config).await.context("writing settings")?;

    println!("wrote {}", config.display());
    println!("device id: {}", settings.device_id);
    Ok(())
}

fn print_summary(summary: &SyncSummary) {
    println!(
        "sync complete in {:?}: {} uploaded, {} downloaded, {} deleted remotely, {} deleted locally",
        summary.duration,
        summary.uploaded,
        summary.downloaded,
        summary.deleted_remote,
        summary.deleted_local,
    );
    if summary.conflicts_resolved > 0 {
        println!(
            "{} conflict(s) resolved ({} pending user attention)",
            summary.conflicts_resolved, summary.conflicts_pending
        );
    }
    if summary.commit_attempts > 1 {
        println!(
            "commit raced with another device and retried ({} attempts)",
            summary.commit_attempts
        );
    }
}
