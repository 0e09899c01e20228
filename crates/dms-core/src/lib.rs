//! # dms-core
//!
//! Shared library for the DMS supervisor containing the size-bounded probe
//! result cache, its JSON snapshot persistence, and the network domain types
//! the supervisor reasons about.
//!
//! This crate has zero dependencies on async runtimes, sockets, or the
//! media-serving component itself.
//!
//! # Architecture overview (for beginners)
//!
//! A media server spends a lot of time *probing* files: running an external
//! tool to find out the container format, duration, streams and so on.  The
//! answer only changes when the file changes, so it is worth remembering
//! across restarts.  The supervisor around the server also has to keep the
//! server bound to every network interface that is up, restarting it when a
//! new interface appears.
//!
//! This crate (`dms-core`) is the shared foundation.  It defines:
//!
//! - **`cache`** – A thread-safe cache bounded by the total serialized size
//!   of its entries (not by entry count), with random eviction, a snapshot
//!   file format with atomic replacement, and a memoizing wrapper around a
//!   probe function.
//!
//! - **`domain`** – Pure types with no OS dependencies: the set of network
//!   interfaces a server instance is bound to, and the allowed client IP
//!   networks.

pub mod cache;
pub mod domain;

// Re-export the most-used types at the crate root so callers can write
// `dms_core::ProbeCache` instead of `dms_core::cache::probe::ProbeCache`.
pub use cache::probe::{CachedProber, ProbeCache, ProbeError, ProbeKey, ProbeResult, Prober};
pub use cache::snapshot::{load_snapshot, save_snapshot, SnapshotError};
pub use cache::store::{RandomReplacementStore, ResultStore};
pub use cache::{BoundedResultCache, CacheItem, DEFAULT_CACHE_CAPACITY};
pub use domain::allowed_net::{is_allowed, parse_allowed_nets, AllowedNet, AllowedNetError};
pub use domain::interfaces::{InterfaceFlags, InterfaceSet, NetworkInterface};
