//! Infrastructure layer for the supervisor.
//!
//! Contains OS-facing adapters: interface enumeration, the serving component
//! and its TCP listener, and configuration file storage.
//!
//! **Dependency rule**: this layer may depend on `dms_core` and `domain`,
//! but MUST NOT import from `application`.

pub mod network;
pub mod serving;
pub mod storage;
