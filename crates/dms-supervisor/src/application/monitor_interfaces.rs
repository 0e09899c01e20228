//! InterfaceMonitor: periodically asks the supervisor to re-bind when new
//! interfaces appear.
//!
//! Every tick the monitor lists the OS interfaces, keeps the usable ones
//! (optionally only the configured one), and compares how many there are
//! with how many the running instance was built for:
//!
//! | current vs. bound | action                      |
//! |-------------------|-----------------------------|
//! | more              | `supervisor.replace(set)`   |
//! | same or fewer     | nothing                     |
//!
//! Only the count is compared, so a renamed or re-addressed interface does
//! not trigger a restart, and neither does an interface going away.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use dms_core::InterfaceSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::application::supervise_server::{ServerSupervisor, SupervisorError};
use crate::infrastructure::network::{InterfaceEnumerator, InterfaceLookupError};

/// Shortest accepted poll interval; `tokio::time::interval` rejects zero.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Watches the interface list on a fixed timer.
pub struct InterfaceMonitor {
    enumerator: Arc<dyn InterfaceEnumerator>,
    if_name: Option<String>,
    poll_interval: Duration,
}

impl InterfaceMonitor {
    /// Creates a monitor.
    ///
    /// With `if_name` set, only that interface is ever considered and its
    /// absence is an error.
    pub fn new(
        enumerator: Arc<dyn InterfaceEnumerator>,
        if_name: Option<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            enumerator,
            if_name,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
        }
    }

    /// The usable interfaces right now.
    ///
    /// A configured interface that exists but is down yields an empty set.
    /// Blocks on the OS lookup; async callers use
    /// [`poll_interfaces`](Self::poll_interfaces).
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::InterfaceLookup`] if enumeration fails or
    /// the configured interface does not exist.
    pub fn current_interfaces(&self) -> Result<InterfaceSet, SupervisorError> {
        select_interfaces(&*self.enumerator, self.if_name.as_deref())
    }

    /// [`current_interfaces`](Self::current_interfaces) on the blocking
    /// thread pool.
    ///
    /// # Errors
    ///
    /// As for `current_interfaces`; a lookup task that panicked is reported
    /// as an enumeration failure.
    pub async fn poll_interfaces(&self) -> Result<InterfaceSet, SupervisorError> {
        let enumerator = Arc::clone(&self.enumerator);
        let if_name = self.if_name.clone();
        tokio::task::spawn_blocking(move || select_interfaces(&*enumerator, if_name.as_deref()))
            .await
            .map_err(|e| InterfaceLookupError::Enumerate(io::Error::other(e)))?
    }

    /// Runs one monitor tick and returns whether a replace was requested.
    ///
    /// # Errors
    ///
    /// Propagates interface lookup and replace failures.
    pub async fn check_once(&self, supervisor: &ServerSupervisor) -> Result<bool, SupervisorError> {
        let current = self.poll_interfaces().await?;
        let bound = supervisor.bound_interface_count().await;

        if !current.has_grown_from(bound) {
            debug!(
                "{} usable interfaces, {bound} bound; nothing to do",
                current.len()
            );
            return Ok(false);
        }

        info!(
            "usable interfaces grew from {bound} to {}: [{}]",
            current.len(),
            current.names().join(", ")
        );
        supervisor.replace(current).await?;
        Ok(true)
    }

    /// Ticks every poll interval until `quit` is cancelled.
    ///
    /// The first check happens one full interval after the call, since the
    /// supervisor has just started an instance on the current interfaces.
    ///
    /// # Errors
    ///
    /// Returns the first failure of [`check_once`](Self::check_once); the
    /// monitor stops at that point.
    pub async fn run(
        self,
        supervisor: Arc<ServerSupervisor>,
        quit: CancellationToken,
    ) -> Result<(), SupervisorError> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = quit.cancelled() => {
                    debug!("interface monitor stopping");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }
            self.check_once(&supervisor).await?;
        }
    }
}

fn select_interfaces(
    enumerator: &dyn InterfaceEnumerator,
    if_name: Option<&str>,
) -> Result<InterfaceSet, SupervisorError> {
    let all = enumerator.list_interfaces()?;

    if let Some(name) = if_name {
        if !all.iter().any(|iface| iface.name == name) {
            return Err(InterfaceLookupError::NotFound(name.to_string()).into());
        }
    }

    Ok(InterfaceSet::select_usable(all, if_name))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
