//! Mock serving component for unit and integration testing.
//!
//! [`MockServerFactory`] records every instance it builds so tests can check
//! which interface sets were served, whether old instances were closed, and
//! can make an instance fail at init, at runtime, or on close.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dms_core::InterfaceSet;
use tokio_util::sync::CancellationToken;

use super::{ServeError, ServerFactory, ServingInstance};

/// A [`ServingInstance`] whose lifecycle is observable and scriptable.
pub struct MockServingInstance {
    interfaces: InterfaceSet,
    fail_init: Option<String>,
    fail_close: bool,
    closed: CancellationToken,
    crash: CancellationToken,
    crash_reason: Mutex<Option<String>>,
    init_calls: AtomicUsize,
    close_calls: AtomicUsize,
    running: AtomicBool,
}

impl MockServingInstance {
    /// Creates an instance that initialises, runs and closes cleanly.
    pub fn new(interfaces: InterfaceSet) -> Self {
        Self {
            interfaces,
            fail_init: None,
            fail_close: false,
            closed: CancellationToken::new(),
            crash: CancellationToken::new(),
            crash_reason: Mutex::new(None),
            init_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            running: AtomicBool::new(false),
        }
    }

    /// Makes a running instance's `run` return an error, as if the component
    /// failed on its own.
    pub fn crash(&self, reason: &str) {
        *self.crash_reason.lock().expect("lock poisoned") = Some(reason.to_string());
        self.crash.cancel();
    }

    /// Number of `init` calls.
    pub fn init_count(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    /// Number of `close` calls.
    pub fn close_count(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// `true` once `close` has been called at least once.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// `true` while `run` is executing.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServingInstance for MockServingInstance {
    fn interfaces(&self) -> &InterfaceSet {
        &self.interfaces
    }

    async fn init(&self) -> Result<(), ServeError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        match &self.fail_init {
            Some(reason) => Err(ServeError::Failed(reason.clone())),
            None => Ok(()),
        }
    }

    async fn run(&self) -> Result<(), ServeError> {
        self.running.store(true, Ordering::SeqCst);
        let result = tokio::select! {
            _ = self.closed.cancelled() => Ok(()),
            _ = self.crash.cancelled() => {
                let reason = self
                    .crash_reason
                    .lock()
                    .expect("lock poisoned")
                    .clone()
                    .unwrap_or_default();
                Err(ServeError::Failed(reason))
            }
        };
        self.running.store(false, Ordering::SeqCst);
        result
    }

    /// Always stops `run`; `fail_close` only changes the reported result.
    async fn close(&self) -> Result<(), ServeError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.cancel();
        if self.fail_close {
            return Err(ServeError::Failed("mock close failure".to_string()));
        }
        Ok(())
    }
}

// ── Factory ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FactoryState {
    built: Vec<Arc<MockServingInstance>>,
    fail_next_build: Option<String>,
    fail_next_init: Option<String>,
    fail_close: bool,
}

/// A [`ServerFactory`] that builds [`MockServingInstance`]s and keeps them.
///
/// Clones share state, so a test can keep one handle while the supervisor
/// owns another.
#[derive(Clone, Default)]
pub struct MockServerFactory {
    state: Arc<Mutex<FactoryState>>,
}

impl MockServerFactory {
    /// Creates a factory whose instances all behave.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `build` call fail, as a bind failure would.
    pub fn fail_next_build(&self, reason: &str) {
        self.state.lock().expect("lock poisoned").fail_next_build = Some(reason.to_string());
    }

    /// Makes the next built instance fail its `init`.
    pub fn fail_next_init(&self, reason: &str) {
        self.state.lock().expect("lock poisoned").fail_next_init = Some(reason.to_string());
    }

    /// Makes every instance built from now on report an error from `close`.
    pub fn fail_close(&self, fail: bool) {
        self.state.lock().expect("lock poisoned").fail_close = fail;
    }

    /// Every instance built so far, oldest first.
    pub fn instances(&self) -> Vec<Arc<MockServingInstance>> {
        self.state.lock().expect("lock poisoned").built.clone()
    }

    /// The most recently built instance.
    pub fn latest(&self) -> Option<Arc<MockServingInstance>> {
        self.state.lock().expect("lock poisoned").built.last().cloned()
    }

    /// Number of successful `build` calls.
    pub fn build_count(&self) -> usize {
        self.state.lock().expect("lock poisoned").built.len()
    }
}

#[async_trait]
impl ServerFactory for MockServerFactory {
    async fn build(
        &self,
        interfaces: InterfaceSet,
    ) -> Result<Arc<dyn ServingInstance>, ServeError> {
        let mut state = self.state.lock().expect("lock poisoned");
        if let Some(reason) = state.fail_next_build.take() {
            return Err(ServeError::Failed(reason));
        }

        let mut instance = MockServingInstance::new(interfaces);
        instance.fail_init = state.fail_next_init.take();
        instance.fail_close = state.fail_close;
        let instance = Arc::new(instance);
        state.built.push(Arc::clone(&instance));
        Ok(instance)
    }
}
