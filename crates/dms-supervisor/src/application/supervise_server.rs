//! ServerSupervisor: owns the single serving-instance slot.
//!
//! The supervisor keeps at most one serving instance alive, replaces it when
//! the interface monitor asks, and shuts everything down in order.
//!
//! # Slot lifecycle
//!
//! ```text
//!            start / replace                 close + await run task
//! Absent ──────────────────────► Running ──────────────────────────► Absent
//!    │                                │
//!    └──────────── stop ──────────────┴──────────────────────────► Stopped
//! ```
//!
//! Every transition happens while holding one async mutex, so two replaces
//! (or a replace racing with `stop`) never interleave, and the old instance
//! has fully exited before the new one binds the same port.
//!
//! # Fatal errors
//!
//! Errors the supervisor cannot recover from (a failing `init`, a serving
//! instance that dies on its own, an interface lookup failure in the
//! monitor) are sent over a channel to [`ServerSupervisor::run`], which
//! returns them to `main`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use dms_core::{save_snapshot, InterfaceSet, ProbeCache};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::application::monitor_interfaces::InterfaceMonitor;
use crate::infrastructure::network::InterfaceLookupError;
use crate::infrastructure::serving::{ServeError, ServerFactory, ServingInstance};

/// How long a closed instance may take to leave `run` before its task is
/// aborted.
const CLOSE_GRACE: Duration = Duration::from_secs(10);

/// Error type for the supervisor.  Every variant is fatal.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Building or initialising a serving instance failed.
    #[error("failed to start serving instance: {0}")]
    Init(#[source] ServeError),

    /// A running serving instance failed without being asked to close.
    #[error("serving instance failed: {0}")]
    Runtime(#[source] ServeError),

    /// The interface list could not be obtained.
    #[error(transparent)]
    InterfaceLookup(#[from] InterfaceLookupError),

    /// [`ServerSupervisor::run`] was called while already running.
    #[error("supervisor run loop is already running")]
    AlreadyRunning,
}

/// The instance currently occupying the slot.
struct ActiveInstance {
    instance: Arc<dyn ServingInstance>,
    closing: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

enum Slot {
    Absent,
    Running(ActiveInstance),
    Stopped,
}

/// Lifecycle owner for the serving component.
pub struct ServerSupervisor {
    factory: Arc<dyn ServerFactory>,
    cache: Arc<ProbeCache>,
    cache_path: PathBuf,
    slot: Mutex<Slot>,
    quit: CancellationToken,
    tracker: TaskTracker,
    fatal_tx: mpsc::UnboundedSender<SupervisorError>,
    fatal_rx: StdMutex<Option<mpsc::UnboundedReceiver<SupervisorError>>>,
}

impl ServerSupervisor {
    /// Creates a supervisor with an empty slot.
    ///
    /// `cache` is the probe cache shared with the serving component; it is
    /// saved to `cache_path` by [`stop`](Self::stop).
    pub fn new(factory: Arc<dyn ServerFactory>, cache: Arc<ProbeCache>, cache_path: PathBuf) -> Self {
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        Self {
            factory,
            cache,
            cache_path,
            slot: Mutex::new(Slot::Absent),
            quit: CancellationToken::new(),
            tracker: TaskTracker::new(),
            fatal_tx,
            fatal_rx: StdMutex::new(Some(fatal_rx)),
        }
    }

    /// The probe cache handed to serving instances.
    pub fn cache(&self) -> &Arc<ProbeCache> {
        &self.cache
    }

    /// Token cancelled when [`stop`](Self::stop) runs.
    pub fn quit_token(&self) -> CancellationToken {
        self.quit.clone()
    }

    /// Builds, initialises and launches an instance for `interfaces`.
    ///
    /// An instance already in the slot is closed first.  After
    /// [`stop`](Self::stop) this does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Init`] if the factory or `init` fails; the
    /// slot is then left empty.
    pub async fn start(&self, interfaces: InterfaceSet) -> Result<(), SupervisorError> {
        let mut slot = self.slot.lock().await;
        if matches!(*slot, Slot::Stopped) {
            warn!("supervisor is stopped; not starting a serving instance");
            return Ok(());
        }
        self.close_locked(&mut slot).await;
        self.start_locked(&mut slot, interfaces).await
    }

    /// Closes the current instance and starts one for `interfaces`.
    ///
    /// The cache and the configuration are untouched.  After
    /// [`stop`](Self::stop) this is a logged no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Init`] if the new instance cannot start.
    pub async fn replace(&self, interfaces: InterfaceSet) -> Result<(), SupervisorError> {
        let mut slot = self.slot.lock().await;
        let bound = match &*slot {
            Slot::Stopped => {
                info!("supervisor is stopped; ignoring replace request");
                return Ok(());
            }
            Slot::Running(active) => active.instance.interfaces().len(),
            Slot::Absent => 0,
        };

        info!(
            "replacing serving instance: {bound} -> {} interfaces",
            interfaces.len()
        );
        self.close_locked(&mut slot).await;
        self.start_locked(&mut slot, interfaces).await
    }

    /// Number of interfaces the current instance was built for, `0` when the
    /// slot is empty.
    pub async fn bound_interface_count(&self) -> usize {
        match &*self.slot.lock().await {
            Slot::Running(active) => active.instance.interfaces().len(),
            Slot::Absent | Slot::Stopped => 0,
        }
    }

    /// `true` while an instance occupies the slot.
    pub async fn is_serving(&self) -> bool {
        matches!(*self.slot.lock().await, Slot::Running(_))
    }

    /// Closes the instance, saves the cache, cancels the quit token and waits
    /// for every background task to exit.
    ///
    /// Close and save failures are logged and never prevent shutdown.
    /// Calling `stop` again only waits for the background tasks.
    pub async fn stop(&self) {
        let first_stop = {
            let mut slot = self.slot.lock().await;
            if matches!(*slot, Slot::Stopped) {
                false
            } else {
                self.close_locked(&mut slot).await;
                *slot = Slot::Stopped;
                true
            }
        };

        if first_stop {
            self.save_cache().await;
        }

        self.quit.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        debug!("supervisor stopped; all background tasks exited");
    }

    /// Starts the run loop as a tracked task, so [`stop`](Self::stop) also
    /// waits for it.
    pub fn spawn_run(
        self: &Arc<Self>,
        monitor: InterfaceMonitor,
    ) -> JoinHandle<Result<(), SupervisorError>> {
        let supervisor = Arc::clone(self);
        self.tracker.spawn(async move { supervisor.run(monitor).await })
    }

    /// Top-level run loop.
    ///
    /// Starts the first instance on the monitor's current interfaces, spawns
    /// the monitor, then waits until either [`stop`](Self::stop) cancels the
    /// quit token (`Ok`) or a fatal error arrives (`Err`).
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`SupervisorError`].
    pub async fn run(self: Arc<Self>, monitor: InterfaceMonitor) -> Result<(), SupervisorError> {
        let mut fatal_rx = self
            .fatal_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(SupervisorError::AlreadyRunning)?;

        let interfaces = monitor.poll_interfaces().await?;
        self.start(interfaces).await?;

        let supervisor = Arc::clone(&self);
        let quit = self.quit.clone();
        let fatal_tx = self.fatal_tx.clone();
        self.tracker.spawn(async move {
            if let Err(e) = monitor.run(supervisor, quit).await {
                report_fatal(&fatal_tx, e);
            }
        });

        tokio::select! {
            _ = self.quit.cancelled() => {
                debug!("run loop: quit requested");
                Ok(())
            }
            fatal = fatal_rx.recv() => match fatal {
                Some(e) => Err(e),
                None => Ok(()),
            },
        }
    }

    // ── Slot transitions (caller holds the slot lock) ─────────────────────────

    async fn start_locked(
        &self,
        slot: &mut Slot,
        interfaces: InterfaceSet,
    ) -> Result<(), SupervisorError> {
        let count = interfaces.len();
        let instance = self
            .factory
            .build(interfaces)
            .await
            .map_err(SupervisorError::Init)?;

        if let Err(e) = instance.init().await {
            if let Err(close_err) = instance.close().await {
                debug!("closing instance after failed init also failed: {close_err}");
            }
            return Err(SupervisorError::Init(e));
        }

        let closing = Arc::new(AtomicBool::new(false));
        let task = self.tracker.spawn(watch_instance(
            Arc::clone(&instance),
            Arc::clone(&closing),
            self.fatal_tx.clone(),
        ));
        info!("serving instance started on {count} interfaces");

        *slot = Slot::Running(ActiveInstance {
            instance,
            closing,
            task,
        });
        Ok(())
    }

    async fn close_locked(&self, slot: &mut Slot) {
        let Slot::Running(active) = std::mem::replace(slot, Slot::Absent) else {
            return;
        };
        let ActiveInstance {
            instance,
            closing,
            mut task,
        } = active;

        closing.store(true, Ordering::SeqCst);
        if let Err(e) = instance.close().await {
            warn!("error closing serving instance: {e}");
        }

        match tokio::time::timeout(CLOSE_GRACE, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("serving instance task panicked: {e}"),
            Err(_) => {
                warn!("serving instance still running {CLOSE_GRACE:?} after close; aborting it");
                task.abort();
                if let Err(e) = task.await {
                    if !e.is_cancelled() {
                        error!("serving instance task panicked: {e}");
                    }
                }
            }
        }
        debug!("serving instance closed");
    }

    async fn save_cache(&self) {
        let cache = Arc::clone(&self.cache);
        let path = self.cache_path.clone();
        let saved = tokio::task::spawn_blocking(move || save_snapshot(&*cache, &path)).await;
        match saved {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!("failed to save probe cache: {e}"),
            Err(e) => error!("probe cache save task panicked: {e}"),
        }
    }
}

/// Runs one instance to completion and reports an unexpected failure.
async fn watch_instance(
    instance: Arc<dyn ServingInstance>,
    closing: Arc<AtomicBool>,
    fatal_tx: mpsc::UnboundedSender<SupervisorError>,
) {
    let result = instance.run().await;
    let closing = closing.load(Ordering::SeqCst);
    match result {
        Ok(()) if closing => debug!("serving instance exited after close"),
        Ok(()) => warn!("serving instance stopped without being closed"),
        Err(e) if closing => debug!("serving instance reported an error while closing: {e}"),
        Err(e) => report_fatal(&fatal_tx, SupervisorError::Runtime(e)),
    }
}

fn report_fatal(fatal_tx: &mpsc::UnboundedSender<SupervisorError>, e: SupervisorError) {
    if let Err(mpsc::error::SendError(e)) = fatal_tx.send(e) {
        error!("fatal error after the run loop exited: {e}");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
