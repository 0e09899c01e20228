//! Domain layer for dms-supervisor.
//!
//! Pure types with no I/O: today only the resolved runtime configuration.
//! Interface sets and allowed networks are shared with other tools and live
//! in `dms_core::domain`.

pub mod config;

pub use config::SupervisorConfig;
