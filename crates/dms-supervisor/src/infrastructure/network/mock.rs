//! Mock interface enumerator for unit and integration testing.
//!
//! Lets tests change the reported interfaces between monitor ticks and make
//! the next lookup fail, without touching the host's real network setup.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};

use dms_core::{InterfaceFlags, NetworkInterface};

use super::{InterfaceEnumerator, InterfaceLookupError};

#[derive(Debug, Default)]
struct MockState {
    interfaces: Vec<NetworkInterface>,
    fail_next: Option<String>,
    calls: usize,
}

/// A scriptable implementation of [`InterfaceEnumerator`].
///
/// Clones share state, so a test can keep one handle while the monitor owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct MockInterfaceEnumerator {
    state: Arc<Mutex<MockState>>,
}

impl MockInterfaceEnumerator {
    /// Creates an enumerator reporting one up interface per name.
    pub fn with_names(names: &[&str]) -> Self {
        let mock = Self::default();
        mock.set_names(names);
        mock
    }

    /// Replaces the reported interfaces with one up interface per name.
    ///
    /// The n-th interface gets the address `10.0.0.(n + 1)` and an MTU of
    /// 1500.
    pub fn set_names(&self, names: &[&str]) {
        let interfaces = names
            .iter()
            .enumerate()
            .map(|(i, name)| up_interface(name, i))
            .collect();
        self.set_interfaces(interfaces);
    }

    /// Replaces the reported interfaces verbatim.
    pub fn set_interfaces(&self, interfaces: Vec<NetworkInterface>) {
        self.state.lock().expect("lock poisoned").interfaces = interfaces;
    }

    /// Makes the next lookup fail with an I/O error carrying `message`.
    pub fn fail_next(&self, message: &str) {
        self.state.lock().expect("lock poisoned").fail_next = Some(message.to_string());
    }

    /// Number of times [`InterfaceEnumerator::list_interfaces`] was called.
    pub fn call_count(&self) -> usize {
        self.state.lock().expect("lock poisoned").calls
    }
}

impl InterfaceEnumerator for MockInterfaceEnumerator {
    fn list_interfaces(&self) -> Result<Vec<NetworkInterface>, InterfaceLookupError> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.calls += 1;
        if let Some(message) = state.fail_next.take() {
            return Err(InterfaceLookupError::Enumerate(std::io::Error::new(
                std::io::ErrorKind::Other,
                message,
            )));
        }
        Ok(state.interfaces.clone())
    }
}

fn up_interface(name: &str, index: usize) -> NetworkInterface {
    let host = u8::try_from(index + 1).unwrap_or(u8::MAX);
    NetworkInterface {
        name: name.to_string(),
        flags: InterfaceFlags {
            up: true,
            loopback: false,
            multicast: true,
        },
        mtu: Some(1500),
        addrs: vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, host))],
    }
}
