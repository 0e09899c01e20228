//! Domain entities for the DMS supervisor.
//!
//! This module contains pure types with no infrastructure dependencies.
//! Enumerating the interfaces of the running machine, binding sockets and
//! parsing configuration files all happen in the supervisor's infrastructure
//! layer; what lands here is the *result* of those operations, in a form that
//! can be compared and tested on any platform.

/// Client IP networks the serving component accepts connections from.
pub mod allowed_net;

/// Network interfaces and the set a server instance is bound to.
pub mod interfaces;
