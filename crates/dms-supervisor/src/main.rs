//! DMS supervisor entry point.
//!
//! Keeps a media server bound to every usable network interface, restarts it
//! when new interfaces appear, and persists the probe cache across restarts.
//!
//! # Usage
//!
//! ```text
//! dms-supervisor [OPTIONS]
//!
//! Options:
//!   --config <PATH>          TOML configuration file
//!   --cache-path <PATH>      Probe cache snapshot file [default: ~/.dms-ffprobe-cache]
//!   --ifname <NAME>          Only serve on this interface
//!   --http <ADDR>            HTTP listen address [default: 0.0.0.0:1338]
//!   --allowed-ips <LIST>     Comma separated allowed client networks
//!   --poll-interval <SECS>   Interface monitor period [default: 30]
//!   --cache-capacity <BYTES> Probe cache capacity [default: 67108864]
//!   --log-level <FILTER>     Log filter when RUST_LOG is unset [default: info]
//!   --write-config           Write the effective settings to the config file and exit
//! ```
//!
//! Every option can also be set through the matching `DMS_*` environment
//! variable; command-line values win over environment values, and both win
//! over the configuration file.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  ├─ load config file, apply CLI overrides
//!  ├─ ProbeCache::new() + load_snapshot()
//!  ├─ ServerSupervisor::spawn_run()
//!  │    ├─ serving instance run task   (ListenerServer)
//!  │    └─ InterfaceMonitor task        (SystemInterfaceEnumerator)
//!  └─ wait for Ctrl-C / SIGTERM or a fatal error, then ServerSupervisor::stop()
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dms_core::{load_snapshot, ProbeCache};
use dms_supervisor::application::{InterfaceMonitor, ServerSupervisor};
use dms_supervisor::domain::SupervisorConfig;
use dms_supervisor::infrastructure::network::SystemInterfaceEnumerator;
use dms_supervisor::infrastructure::serving::ListenerServerFactory;
use dms_supervisor::infrastructure::storage::config::{
    config_file_path, load_config, save_config, ConfigError, FileConfig,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// DLNA media server supervisor.
///
/// Options left unset fall back to the configuration file, then to built-in
/// defaults.
#[derive(Debug, Parser)]
#[command(
    name = "dms-supervisor",
    about = "Keeps a DLNA media server bound to every usable network interface",
    version
)]
struct Cli {
    /// TOML configuration file (defaults to the platform config directory).
    #[arg(long, env = "DMS_CONFIG")]
    config: Option<PathBuf>,

    /// Probe cache snapshot file.
    #[arg(long, env = "DMS_CACHE_PATH")]
    cache_path: Option<PathBuf>,

    /// Only serve on the interface with this name.
    #[arg(long, env = "DMS_IFNAME")]
    ifname: Option<String>,

    /// `ip:port` the HTTP listener binds to.
    #[arg(long, env = "DMS_HTTP")]
    http: Option<String>,

    /// Comma separated client networks, e.g. `192.168.1.0/24,10.0.0.7`.
    ///
    /// An empty list allows every client.
    #[arg(long, env = "DMS_ALLOWED_IPS")]
    allowed_ips: Option<String>,

    /// Seconds between interface checks.
    #[arg(long, env = "DMS_POLL_INTERVAL", value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval: Option<u64>,

    /// Probe cache capacity in bytes of serialized entries.
    #[arg(long, env = "DMS_CACHE_CAPACITY")]
    cache_capacity: Option<u64>,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, env = "DMS_LOG_LEVEL")]
    log_level: Option<String>,

    /// Write the effective settings to the config file and exit.
    #[arg(long)]
    write_config: bool,
}

impl Cli {
    /// The configuration file to read: `--config` or the platform default.
    fn config_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config_file_path(),
        }
    }

    /// Layers the CLI values over `file`.
    fn layer_over(self, mut file: FileConfig) -> FileConfig {
        if let Some(path) = self.cache_path {
            file.cache.path = path;
        }
        if let Some(capacity) = self.cache_capacity {
            file.cache.capacity_bytes = capacity;
        }
        if let Some(name) = self.ifname {
            file.network.interface = Some(name);
        }
        if let Some(addr) = self.http {
            file.network.bind_address = addr;
        }
        if let Some(list) = self.allowed_ips {
            file.network.allowed_ips = list;
        }
        if let Some(secs) = self.poll_interval {
            file.network.poll_interval_secs = secs;
        }
        if let Some(level) = self.log_level {
            file.logging.level = level;
        }
        file
    }
}

/// Resolves the layered settings into the runtime configuration.
///
/// # Errors
///
/// Returns an error if the bind address or poll interval is invalid.
fn resolve(file: FileConfig) -> anyhow::Result<SupervisorConfig> {
    file.into_supervisor_config()
        .context("invalid supervisor configuration")
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let write_config = cli.write_config;

    // The log level may come from the file, so read it before logging starts
    // and report any problem with it afterwards.
    let config_path = cli.config_path();
    let (file, load_err) = match &config_path {
        Ok(path) => match load_config(path) {
            Ok(file) => (file, None),
            Err(e) => (FileConfig::default(), Some(e)),
        },
        Err(_) => (FileConfig::default(), None),
    };
    let file = cli.layer_over(file);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&file.logging.level)),
        )
        .init();

    if let Some(e) = load_err {
        if write_config {
            return Err(e).context("refusing to overwrite an unreadable configuration file");
        }
        warn!("using default configuration: {e}");
    }

    if write_config {
        let path = config_path.context("no configuration file location")?;
        save_config(&path, &file)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("wrote configuration to {}", path.display());
        return Ok(());
    }
    if let Err(e) = &config_path {
        warn!("using default configuration: {e}");
    }

    let config = resolve(file)?;

    info!(
        "dms-supervisor starting: http={}, cache={}, interface={}",
        config.bind_addr,
        config.cache_path.display(),
        config.if_name.as_deref().unwrap_or("all")
    );

    // ── Probe cache ───────────────────────────────────────────────────────────
    let cache = Arc::new(ProbeCache::new(config.cache_capacity));
    if let Err(e) = load_snapshot(&*cache, &config.cache_path) {
        warn!("starting with an empty probe cache: {e}");
    }

    // ── Supervisor and monitor ────────────────────────────────────────────────
    let factory = Arc::new(ListenerServerFactory::new(
        config.bind_addr,
        config.allowed_nets.clone(),
    ));
    let supervisor = Arc::new(ServerSupervisor::new(
        factory,
        Arc::clone(&cache),
        config.cache_path.clone(),
    ));
    let monitor = InterfaceMonitor::new(
        Arc::new(SystemInterfaceEnumerator::new()),
        config.if_name.clone(),
        config.poll_interval,
    );
    let mut run = supervisor.spawn_run(monitor);

    let outcome = tokio::select! {
        joined = &mut run => Some(joined),
        _ = shutdown_signal() => None,
    };

    supervisor.stop().await;

    match outcome {
        None | Some(Ok(Ok(()))) => {
            info!("dms-supervisor stopped");
            Ok(())
        }
        Some(Ok(Err(e))) => {
            error!("fatal: {e}");
            Err(e).context("supervisor stopped on a fatal error")
        }
        Some(Err(e)) => Err(e).context("supervisor run loop panicked"),
    }
}

/// Completes on Ctrl-C, or on SIGTERM where available.
///
/// If no signal can be listened for, this never completes and only a fatal
/// error ends the process.
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C; shutting down"),
            Err(e) => {
                error!("failed to listen for Ctrl+C signal: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("received SIGTERM; shutting down");
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
