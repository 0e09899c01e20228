//! Application layer use cases for the supervisor.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure types) and the infrastructure (OS, network, storage).
//!
//! Use cases in this layer:
//!
//! - **Orchestrate** domain objects to fulfil a goal (e.g., "keep exactly one
//!   media server running, bound to every usable interface").
//! - **Depend on abstractions** (traits such as `ServerFactory` and
//!   `InterfaceEnumerator`) rather than concrete implementations, so tests
//!   can swap in mocks.
//! - **Contain no direct OS calls**.
//!
//! # Sub-modules
//!
//! - **`supervise_server`** – Owns the serving-instance slot: start, replace,
//!   stop, and the top-level run loop that surfaces fatal errors.
//!
//! - **`monitor_interfaces`** – Polls the interface list on a timer and asks
//!   the supervisor to replace the instance when new interfaces appear.

pub mod monitor_interfaces;
pub mod supervise_server;

pub use monitor_interfaces::InterfaceMonitor;
pub use supervise_server::{ServerSupervisor, SupervisorError};
