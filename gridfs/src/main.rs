use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use gridfs::config::{self, Cli, Commands, MountPlan, StoreSettings};
use gridfs::daemon::{self, DiagState};
use gridfs::fuse::GridFuse;
use gridfs::fuse::mount::mount_gridfs;
use gridfs::meta::InodeRecord;
use gridfs::store::Query;

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(l) => EnvFilter::new(l),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());
    let file = config::load_optional(cli.config.as_deref())?;

    match cli.command {
        Commands::Mount(args) => run_mount(args.resolve(&file)?).await,
        Commands::Query(args) => {
            let plan = args.resolve(&file)?;
            run_query(&plan.store, &plan.expr).await
        }
    }
}

async fn run_mount(plan: MountPlan) -> Result<()> {
    let fs = plan
        .store
        .open()
        .await
        .context("Failed to connect to the backing store")?;
    info!(backend = ?plan.store.backend, "backing store connected");

    let fuse = GridFuse::new(fs.clone());
    let stats = fuse.stats();
    let mut mount_handle = mount_gridfs(fuse, &plan.mountpoint, &plan.mount)
        .await
        .with_context(|| format!("Failed to mount at {}", plan.mountpoint.display()))?;
    info!(mountpoint = %plan.mountpoint.display(), "filesystem mounted");

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let diag = plan.diag_addr.map(|addr| {
        let state = Arc::new(DiagState::new(fs, stats));
        tokio::spawn(async move {
            let shutdown = async move {
                let _ = stop_rx.await;
            };
            if let Err(e) = daemon::serve(addr, state, shutdown).await {
                error!(error = %e, "diagnostics endpoint stopped");
            }
        })
    });

    let handle = &mut mount_handle;
    let result = tokio::select! {
        res = handle => {
            info!("filesystem unmounted externally");
            res.context("FUSE session ended with an error")
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, unmounting");
            mount_handle.unmount().await.context("Failed to unmount")
        }
    };

    let _ = stop_tx.send(());
    if let Some(task) = diag {
        let _ = task.await;
    }
    result
}

async fn run_query(store: &StoreSettings, expr: &str) -> Result<()> {
    let query: Query = expr.parse().context("Invalid query expression")?;
    let fs = store
        .open()
        .await
        .context("Failed to connect to the backing store")?;
    let records: Vec<InodeRecord> = fs
        .store()
        .query_values(&query)
        .await
        .context("Query failed")?;
    info!(matches = records.len(), %query, "query finished");
    for record in &records {
        println!("{}", serde_json::to_string(record)?);
    }
    Ok(())
}
