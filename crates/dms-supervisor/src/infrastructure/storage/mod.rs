//! Storage infrastructure: configuration file persistence.
//!
//! This module provides a thin adapter between the application and the
//! file system.  The `config` sub-module handles:
//!
//! - Reading the TOML configuration file from the platform-appropriate
//!   directory (or an explicit `--config` path).
//! - Writing a configuration file back to disk.
//! - Providing sensible defaults when the file does not exist yet.
//!
//! The probe cache snapshot is *not* handled here: its format and atomic
//! replacement belong to `dms_core::cache::snapshot`.

pub mod config;
