//! Supervisor configuration types.
//!
//! [`SupervisorConfig`] is the single source of truth for all runtime
//! settings.  It is resolved once at startup (config file first, then CLI
//! arguments and environment variables on top) and then shared read-only.
//!
//! # Design rationale
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! variable reads inside the domain) makes the supervisor easy to embed in
//! tests.  The infrastructure layer is responsible for populating the struct
//! from the TOML file, and `main.rs` layers the CLI on top.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

use dms_core::{AllowedNet, DEFAULT_CACHE_CAPACITY};

/// File name of the probe cache snapshot, relative to the user's home.
pub const DEFAULT_CACHE_FILE_NAME: &str = ".dms-ffprobe-cache";

/// Port the media server listens on unless configured otherwise.
pub const DEFAULT_HTTP_PORT: u16 = 1338;

/// How often the interface monitor looks for new interfaces.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// All runtime configuration for the supervisor.
///
/// # Example
///
/// ```rust
/// use dms_supervisor::domain::SupervisorConfig;
///
/// let cfg = SupervisorConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 1338);
/// assert!(cfg.if_name.is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorConfig {
    /// Where the probe cache snapshot is read at startup and written at
    /// shutdown.
    pub cache_path: PathBuf,

    /// Upper bound on the total serialized size of cached probe results,
    /// in bytes.
    pub cache_capacity: u64,

    /// Interval between two interface monitor ticks.
    pub poll_interval: Duration,

    /// Restrict serving to the interface with this exact name.
    ///
    /// `None` serves on every usable interface.
    pub if_name: Option<String>,

    /// Address and port the media server's HTTP listener binds to.
    pub bind_addr: SocketAddr,

    /// Client networks allowed to talk to the media server.
    pub allowed_nets: Vec<AllowedNet>,
}

impl Default for SupervisorConfig {
    /// Returns a `SupervisorConfig` suitable for local development.
    ///
    /// | Field          | Default                         |
    /// |----------------|---------------------------------|
    /// | cache_path     | `.dms-ffprobe-cache` (cwd)      |
    /// | cache_capacity | 64 MiB                          |
    /// | poll_interval  | 30 seconds                      |
    /// | if_name        | none (all interfaces)           |
    /// | bind_addr      | `0.0.0.0:1338`                  |
    /// | allowed_nets   | `0.0.0.0/0`, `::/0`             |
    fn default() -> Self {
        Self {
            cache_path: PathBuf::from(DEFAULT_CACHE_FILE_NAME),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            if_name: None,
            bind_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_HTTP_PORT)),
            allowed_nets: vec![AllowedNet::any_v4(), AllowedNet::any_v6()],
        }
    }
}
