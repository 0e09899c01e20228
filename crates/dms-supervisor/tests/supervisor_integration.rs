//! Integration tests for the full supervisor loop.
//!
//! These tests wire a real [`ServerSupervisor`] and [`InterfaceMonitor`] to
//! the mock interface enumerator and the mock serving component, then drive
//! the loop through interface changes, failures and shutdown.

use std::sync::Arc;
use std::time::Duration;

use dms_core::{load_snapshot, parse_allowed_nets, InterfaceSet, ProbeCache, ProbeKey};
use dms_supervisor::application::{InterfaceMonitor, ServerSupervisor, SupervisorError};
use dms_supervisor::infrastructure::network::{InterfaceEnumerator, MockInterfaceEnumerator};
use dms_supervisor::infrastructure::serving::{
    ListenerServerFactory, MockServerFactory, ServerFactory, ServingInstance,
};
use serde_json::json;

// ── Helpers ───────────────────────────────────────────────────────────────────

const FAST_POLL: Duration = Duration::from_millis(20);

/// Polls `condition` until it holds or two seconds pass.
async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

struct Harness {
    supervisor: Arc<ServerSupervisor>,
    enumerator: MockInterfaceEnumerator,
    factory: MockServerFactory,
    cache_path: std::path::PathBuf,
    _dir: tempfile::TempDir,
}

fn harness(initial: &[&str]) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache_path = dir.path().join("probe-cache.json");
    let factory = MockServerFactory::new();
    let supervisor = Arc::new(ServerSupervisor::new(
        Arc::new(factory.clone()),
        Arc::new(ProbeCache::new(1 << 20)),
        cache_path.clone(),
    ));
    Harness {
        supervisor,
        enumerator: MockInterfaceEnumerator::with_names(initial),
        factory,
        cache_path,
        _dir: dir,
    }
}

impl Harness {
    fn monitor(&self) -> InterfaceMonitor {
        InterfaceMonitor::new(Arc::new(self.enumerator.clone()), None, FAST_POLL)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

/// A new interface coming up replaces the instance with one bound to both.
#[tokio::test]
async fn test_new_interface_replaces_running_instance() {
    // Arrange
    let h = harness(&["eth0"]);
    let run = h.supervisor.spawn_run(h.monitor());
    assert!(eventually(|| h.factory.build_count() == 1).await);

    // Act
    h.enumerator.set_names(&["eth0", "wlan0"]);

    // Assert
    assert!(eventually(|| h.factory.build_count() == 2).await);
    let instances = h.factory.instances();
    assert!(eventually(|| instances[0].is_closed()).await);
    assert_eq!(instances[1].interfaces().len(), 2);
    assert_eq!(h.supervisor.bound_interface_count().await, 2);

    h.supervisor.stop().await;
    assert!(run.await.expect("join").is_ok());
}

/// Losing an interface keeps the instance that is already running.
#[tokio::test]
async fn test_lost_interface_keeps_running_instance() {
    let h = harness(&["eth0", "wlan0"]);
    let run = h.supervisor.spawn_run(h.monitor());
    assert!(eventually(|| h.factory.build_count() == 1).await);

    h.enumerator.set_names(&["eth0"]);
    // Give the monitor several ticks to react.
    tokio::time::sleep(FAST_POLL * 5).await;

    assert_eq!(h.factory.build_count(), 1);
    assert_eq!(h.supervisor.bound_interface_count().await, 2);

    h.supervisor.stop().await;
    assert!(run.await.expect("join").is_ok());
}

/// An instance failing on its own ends the run loop with a runtime error.
#[tokio::test]
async fn test_instance_crash_is_reported_as_fatal() {
    // Arrange
    let h = harness(&["eth0"]);
    let run = h.supervisor.spawn_run(h.monitor());
    assert!(eventually(|| h.factory.build_count() == 1).await);
    let instance = h.factory.latest().expect("instance");
    assert!(eventually(|| instance.is_running()).await);

    // Act
    instance.crash("media directory vanished");
    let result = run.await.expect("join");

    // Assert
    assert!(matches!(result, Err(SupervisorError::Runtime(_))));
    h.supervisor.stop().await;
    assert!(h.cache_path.exists(), "cache is still saved after a fatal error");
}

/// An enumeration failure in the monitor ends the run loop.
#[tokio::test]
async fn test_monitor_lookup_failure_is_fatal() {
    let h = harness(&["eth0"]);
    let run = h.supervisor.spawn_run(h.monitor());
    assert!(eventually(|| h.factory.build_count() == 1).await);

    h.enumerator.fail_next("netlink socket closed");
    let result = run.await.expect("join");

    assert!(matches!(result, Err(SupervisorError::InterfaceLookup(_))));
    h.supervisor.stop().await;
}

/// A failing replacement is fatal and leaves no instance serving.
#[tokio::test]
async fn test_replacement_init_failure_is_fatal() {
    let h = harness(&["eth0"]);
    let run = h.supervisor.spawn_run(h.monitor());
    assert!(eventually(|| h.factory.build_count() == 1).await);

    h.factory.fail_next_init("port 1338 already in use");
    h.enumerator.set_names(&["eth0", "eth1"]);
    let result = run.await.expect("join");

    assert!(matches!(result, Err(SupervisorError::Init(_))));
    assert!(!h.supervisor.is_serving().await);
    h.supervisor.stop().await;
}

/// Probe results collected while serving survive a supervisor restart.
#[tokio::test]
async fn test_cache_survives_supervisor_restart() {
    // Arrange: first supervisor lifetime
    let h = harness(&["eth0"]);
    let run = h.supervisor.spawn_run(h.monitor());
    assert!(eventually(|| h.factory.build_count() == 1).await);
    let key = ProbeKey::new("/srv/media/film.mkv", 1_700_000_000_000_000_000);
    h.supervisor
        .cache()
        .set(key.clone(), json!({ "format": { "duration": "5400.0" } }));

    // Act
    h.supervisor.stop().await;
    assert!(run.await.expect("join").is_ok());
    let restored = ProbeCache::new(1 << 20);
    let loaded = load_snapshot(&restored, &h.cache_path).expect("load");

    // Assert
    assert_eq!(loaded, 1);
    assert_eq!(
        restored.get(&key),
        Some(json!({ "format": { "duration": "5400.0" } }))
    );
}

/// Once stopped, interface growth no longer starts instances.
#[tokio::test]
async fn test_no_replace_after_stop() {
    let h = harness(&["eth0"]);
    let run = h.supervisor.spawn_run(h.monitor());
    assert!(eventually(|| h.factory.build_count() == 1).await);

    h.supervisor.stop().await;
    assert!(run.await.expect("join").is_ok());
    h.enumerator.set_names(&["eth0", "eth1", "eth2"]);
    tokio::time::sleep(FAST_POLL * 5).await;

    assert_eq!(h.factory.build_count(), 1);
    assert!(!h.supervisor.is_serving().await);
}

/// The production listener factory works end to end on loopback.
#[tokio::test]
async fn test_listener_factory_serves_and_closes() {
    // Arrange
    let factory =
        ListenerServerFactory::new("127.0.0.1:0".parse().expect("addr"), parse_allowed_nets(""));
    let enumerator = MockInterfaceEnumerator::with_names(&["veth0"]);
    let set = InterfaceSet::select_usable(enumerator.list_interfaces().expect("lookup"), None);

    // Act
    let instance = factory.build(set).await.expect("build");
    instance.init().await.expect("init");
    let runner = Arc::clone(&instance);
    let task = tokio::spawn(async move { runner.run().await });
    instance.close().await.expect("close");

    // Assert
    let result = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("run exits after close")
        .expect("join");
    assert!(result.is_ok());
    assert_eq!(instance.interfaces().len(), 1);
}

/// Replacing a listener-backed instance rebinds the same fixed port.
#[tokio::test]
async fn test_replace_rebinds_the_same_listener_port() {
    // Arrange: reserve a free port, then release it for the supervisor
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .expect("free port");
    let dir = tempfile::tempdir().expect("tempdir");
    let supervisor = ServerSupervisor::new(
        Arc::new(ListenerServerFactory::new(addr, parse_allowed_nets(""))),
        Arc::new(ProbeCache::new(1 << 20)),
        dir.path().join("probe-cache.json"),
    );
    let one = MockInterfaceEnumerator::with_names(&["eth0"]);
    let two = MockInterfaceEnumerator::with_names(&["eth0", "wlan0"]);
    supervisor
        .start(InterfaceSet::select_usable(one.list_interfaces().expect("lookup"), None))
        .await
        .expect("start");
    let _client = tokio::net::TcpStream::connect(addr)
        .await
        .expect("first instance accepts");

    // Act
    let replaced = supervisor
        .replace(InterfaceSet::select_usable(two.list_interfaces().expect("lookup"), None))
        .await;

    // Assert
    assert!(replaced.is_ok(), "replace failed: {replaced:?}");
    assert_eq!(supervisor.bound_interface_count().await, 2);
    tokio::net::TcpStream::connect(addr)
        .await
        .expect("new instance accepts on the same port");
    supervisor.stop().await;
}

/// A named interface that exists but is down is not fatal at startup; the
/// supervisor serves on it once it comes up.
#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_named_down_interface_starts_empty_then_grows() {
    use dms_supervisor::infrastructure::network::SystemInterfaceEnumerator;

    // Arrange
    let root = tempfile::tempdir().expect("tempdir");
    let dir = root.path().join("dmstest-ifb0");
    std::fs::create_dir_all(&dir).expect("create interface dir");
    std::fs::write(dir.join("flags"), "0x82\n").expect("write flags");
    std::fs::write(dir.join("mtu"), "1500\n").expect("write mtu");
    let h = harness(&[]);
    let monitor = InterfaceMonitor::new(
        Arc::new(SystemInterfaceEnumerator::with_sysfs_root(root.path())),
        Some("dmstest-ifb0".to_string()),
        FAST_POLL,
    );

    // Act
    let run = h.supervisor.spawn_run(monitor);
    assert!(eventually(|| h.factory.build_count() == 1).await);
    let started_on = h.factory.latest().expect("instance").interfaces().len();
    std::fs::write(dir.join("flags"), "0x1083\n").expect("write flags");

    // Assert
    assert_eq!(started_on, 0);
    assert!(eventually(|| h.factory.build_count() == 2).await);
    assert_eq!(h.supervisor.bound_interface_count().await, 1);
    h.supervisor.stop().await;
    assert!(run.await.expect("join").is_ok());
}
