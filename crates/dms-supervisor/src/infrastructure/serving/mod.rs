//! The media-serving component as seen by the supervisor.
//!
//! The supervisor does not know what protocol the serving component speaks.
//! It only needs a handful of lifecycle operations, captured by two traits:
//!
//! ```text
//! ServerFactory::build(interfaces) ──► Arc<dyn ServingInstance>
//!                                          │
//!                                          ├─ init()   once, before run
//!                                          ├─ run()    until closed or failed
//!                                          └─ close()  from another task, any time
//! ```
//!
//! One instance is built per [`InterfaceSet`].  When the set grows the
//! supervisor closes the instance and builds a fresh one; instances are never
//! reconfigured in place.
//!
//! # Sub-modules
//!
//! - **`listener`** – The built-in component: a TCP listener that filters
//!   peers by the allowed networks and hands accepted connections to a
//!   handler.
//! - **`mock`** – Scriptable instances and factory for tests.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use dms_core::InterfaceSet;
use thiserror::Error;

pub mod listener;
pub mod mock;

pub use listener::{ListenerServer, ListenerServerFactory};
pub use mock::{MockServerFactory, MockServingInstance};

/// Error type for serving-component operations.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// An I/O error ended the accept loop.
    #[error("I/O error while serving: {0}")]
    Io(#[from] std::io::Error),

    /// Any other failure reported by the component.
    #[error("{0}")]
    Failed(String),
}

/// One running (or runnable) serving-component instance.
#[async_trait]
pub trait ServingInstance: Send + Sync {
    /// The interface set this instance was built for.
    fn interfaces(&self) -> &InterfaceSet;

    /// Prepares the instance.  Called exactly once, before [`run`](Self::run).
    async fn init(&self) -> Result<(), ServeError>;

    /// Serves until [`close`](Self::close) is called or a fatal error occurs.
    ///
    /// Returns `Ok(())` after a close.
    async fn run(&self) -> Result<(), ServeError>;

    /// Asks [`run`](Self::run) to return.
    ///
    /// Safe to call more than once and on an instance whose `run` already
    /// failed.
    async fn close(&self) -> Result<(), ServeError>;
}

/// Builds serving instances for a given interface set.
#[async_trait]
pub trait ServerFactory: Send + Sync {
    /// Creates (but does not initialise) an instance bound to `interfaces`.
    async fn build(&self, interfaces: InterfaceSet)
        -> Result<Arc<dyn ServingInstance>, ServeError>;
}
