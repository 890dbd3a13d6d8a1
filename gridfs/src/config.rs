//! Command line and configuration file.
//!
//! Every setting can come from an optional YAML file (`--config`); values given
//! on the command line win over the file.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::fuse::mount::MountSettings;
use crate::store::xline::parse_endpoints;
use crate::store::{InMemoryStore, StoreClient, StoreError, XlineConfig};
use crate::vfs::GridFs;

#[derive(Parser, Debug)]
#[command(name = "gridfs", version, about = "Mount a key-value store as a filesystem")]
pub struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `gridfs=debug` (overrides RUST_LOG)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Mount the store at MOUNTPOINT and serve until unmounted or interrupted
    Mount(MountArgs),
    /// Run a filter expression against the metadata region
    Query(QueryArgs),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// etcd v3 compatible endpoint (xline, etcd)
    #[default]
    Xline,
    /// Process-local store; contents vanish on exit
    Memory,
}

#[derive(Args, Debug, Default)]
pub struct StoreArgs {
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Key prefix under which both regions live
    #[arg(long)]
    pub prefix: Option<String>,

    #[arg(long)]
    pub username: Option<String>,

    #[arg(long, env = "GRIDFS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[arg(long, value_name = "SECS")]
    pub connect_timeout: Option<u64>,
}

#[derive(Args, Debug, Default)]
pub struct MountArgs {
    /// Store endpoint(s), comma separated host:port
    pub endpoint: Option<String>,

    /// Empty directory to mount on
    pub mountpoint: Option<PathBuf>,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Serve /healthz and /stats on this address
    #[arg(long)]
    pub diag_addr: Option<SocketAddr>,

    #[arg(long)]
    pub allow_other: bool,

    /// Call mount(2) directly instead of going through fusermount3
    #[arg(long)]
    pub privileged: bool,
}

/// `query [ENDPOINT] EXPR`: a single argument is the expression, and the
/// endpoints then come from the config file.
#[derive(Args, Debug, Default)]
pub struct QueryArgs {
    /// Store endpoint(s), comma separated host:port
    pub endpoint: Option<String>,

    /// e.g. "select * from /metadata where parent = '/docs'"
    pub expr: Option<String>,

    #[command(flatten)]
    pub store: StoreArgs,
}

/// Contents of the YAML configuration file.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    pub backend: Option<Backend>,
    pub endpoints: Vec<String>,
    pub prefix: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub mountpoint: Option<PathBuf>,
    pub diag_addr: Option<SocketAddr>,
    pub allow_other: bool,
    pub unprivileged: Option<bool>,
}

pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let cfg: FileConfig = serde_yaml::from_str(&content).context("Failed to parse YAML config")?;
    Ok(cfg)
}

/// Load `path` if given, otherwise start from defaults.
pub fn load_optional(path: Option<&Path>) -> Result<FileConfig> {
    match path {
        Some(p) => load_config(p),
        None => Ok(FileConfig::default()),
    }
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub backend: Backend,
    pub xline: XlineConfig,
}

impl StoreSettings {
    fn resolve(endpoint: Option<&str>, args: &StoreArgs, file: &FileConfig) -> Result<Self> {
        let backend = args.backend.or(file.backend).unwrap_or_default();
        let endpoints = match endpoint {
            Some(list) => parse_endpoints(list),
            None => file.endpoints.clone(),
        };
        if backend == Backend::Xline && endpoints.is_empty() {
            bail!("no store endpoint given on the command line or in the config file");
        }

        let mut xline = XlineConfig::new(endpoints);
        if let Some(prefix) = args.prefix.clone().or_else(|| file.prefix.clone()) {
            xline.prefix = prefix;
        }
        xline.username = args.username.clone().or_else(|| file.username.clone());
        xline.password = args.password.clone().or_else(|| file.password.clone());
        if let Some(secs) = args.connect_timeout.or(file.connect_timeout_secs) {
            xline.connect_timeout_secs = secs;
        }
        Ok(Self { backend, xline })
    }

    /// Connect the selected backend and wrap it in a filesystem root.
    pub async fn open(&self) -> std::result::Result<GridFs, StoreError> {
        match self.backend {
            Backend::Xline => GridFs::connect(&self.xline).await,
            Backend::Memory => Ok(GridFs::new(StoreClient::new(InMemoryStore::new()))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub store: StoreSettings,
    pub expr: String,
}

#[derive(Debug, Clone)]
pub struct MountPlan {
    pub store: StoreSettings,
    pub mountpoint: PathBuf,
    pub diag_addr: Option<SocketAddr>,
    pub mount: MountSettings,
}

impl MountArgs {
    pub fn resolve(&self, file: &FileConfig) -> Result<MountPlan> {
        let store = StoreSettings::resolve(self.endpoint.as_deref(), &self.store, file)?;
        let Some(mountpoint) = self.mountpoint.clone().or_else(|| file.mountpoint.clone()) else {
            bail!("no mountpoint given on the command line or in the config file");
        };
        let unprivileged = !self.privileged && file.unprivileged.unwrap_or(true);
        Ok(MountPlan {
            store,
            mountpoint,
            diag_addr: self.diag_addr.or(file.diag_addr),
            mount: MountSettings {
                unprivileged,
                allow_other: self.allow_other || file.allow_other,
            },
        })
    }
}

impl QueryArgs {
    pub fn resolve(&self, file: &FileConfig) -> Result<QueryPlan> {
        let (endpoint, expr) = match (&self.endpoint, &self.expr) {
            (Some(endpoint), Some(expr)) => (Some(endpoint.as_str()), expr),
            (Some(expr), None) => (None, expr),
            (None, _) => bail!("no query expression given"),
        };
        Ok(QueryPlan {
            store: StoreSettings::resolve(endpoint, &self.store, file)?,
            expr: expr.clone(),
        })
    }
}
