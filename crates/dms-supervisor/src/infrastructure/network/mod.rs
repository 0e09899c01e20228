//! Network interface enumeration.
//!
//! The interface monitor needs to know, every tick, which interfaces the OS
//! currently reports.  This module hides *how* that list is obtained behind
//! the [`InterfaceEnumerator`] trait.
//!
//! # Sub-modules
//!
//! - **`system`** – The production enumerator.  On Linux every interface
//!   under `/sys/class/net` is listed with its `IFF_UP` flag and MTU, whether
//!   or not it has an address; addresses come from `get_if_addrs`.
//!
//! - **`mock`** – A scriptable enumerator for tests: the interface list can be
//!   changed between ticks and lookups can be made to fail.
//!
//! # Testability
//!
//! Application code depends only on the trait, so the monitor and the
//! supervisor run unchanged against [`mock::MockInterfaceEnumerator`].

use dms_core::NetworkInterface;
use thiserror::Error;

pub mod mock;
pub mod system;

pub use mock::MockInterfaceEnumerator;
pub use system::SystemInterfaceEnumerator;

/// Error type for interface lookups.
///
/// Both variants are fatal for the supervisor: without a trustworthy
/// interface list it cannot decide where to serve.
#[derive(Debug, Error)]
pub enum InterfaceLookupError {
    /// The OS refused to list interfaces.
    #[error("failed to enumerate network interfaces: {0}")]
    Enumerate(#[source] std::io::Error),

    /// A specific interface was requested but the OS does not report it.
    #[error("network interface {0:?} not found")]
    NotFound(String),
}

/// Trait abstracting the OS interface list.
///
/// The production implementation is [`SystemInterfaceEnumerator`]; tests use
/// [`MockInterfaceEnumerator`].
pub trait InterfaceEnumerator: Send + Sync {
    /// Returns every interface the OS reports, usable or not, one entry per
    /// interface name.
    fn list_interfaces(&self) -> Result<Vec<NetworkInterface>, InterfaceLookupError>;
}
