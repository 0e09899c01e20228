//! Network interfaces and the interface set bound to a server instance.
//!
//! The supervisor captures an [`InterfaceSet`] every time the interface
//! monitor ticks.  Each serving-component instance is constructed with one
//! set and keeps it for its whole life; a later, *larger* set is the signal
//! that the instance must be replaced.
//!
//! # Why compare by cardinality only?
//!
//! Interface names and addresses churn (DHCP renewals, VPNs reconnecting,
//! Wi-Fi roaming).  The policy implemented by the monitor is deliberately
//! coarse: only growth in the number of usable interfaces triggers a restart.
//! A shrinking set is tolerated so that a flapping interface does not cause a
//! restart storm.

use std::net::IpAddr;

/// Subset of the OS interface flags the supervisor cares about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceFlags {
    /// The administrative `IFF_UP` flag.
    pub up: bool,
    /// The interface is a loopback device.
    pub loopback: bool,
    /// The interface supports multicast (needed for SSDP announcements).
    pub multicast: bool,
}

/// One network interface as observed at a single point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    /// OS interface name, e.g. `eth0`, `wlan0`, `en0`.
    pub name: String,
    /// State flags reported by the OS.
    pub flags: InterfaceFlags,
    /// Maximum transmission unit, `None` when the platform does not expose it.
    pub mtu: Option<u32>,
    /// Addresses configured on the interface.
    pub addrs: Vec<IpAddr>,
}

impl NetworkInterface {
    /// Returns `true` when the interface is up and its MTU is positive.
    ///
    /// An unknown MTU is treated as positive: platforms that cannot report
    /// it only list interfaces that carry an address.
    pub fn is_usable(&self) -> bool {
        self.flags.up && self.mtu.map_or(true, |mtu| mtu > 0)
    }
}

/// The set of usable interfaces captured at one monitor tick.
///
/// Interfaces are kept sorted by name and unique by name, so two sets built
/// from the same OS snapshot compare equal regardless of enumeration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceSet {
    interfaces: Vec<NetworkInterface>,
}

impl InterfaceSet {
    /// Builds a set from already-filtered interfaces.
    pub fn new(mut interfaces: Vec<NetworkInterface>) -> Self {
        interfaces.sort_by(|a, b| a.name.cmp(&b.name));
        interfaces.dedup_by(|a, b| a.name == b.name);
        Self { interfaces }
    }

    /// Selects the usable interfaces from `candidates`.
    ///
    /// When `name_filter` is `Some`, only the interface with that exact name
    /// is considered.  Interfaces that are down or report a zero MTU are
    /// dropped.
    pub fn select_usable(candidates: Vec<NetworkInterface>, name_filter: Option<&str>) -> Self {
        let selected = candidates
            .into_iter()
            .filter(|iface| name_filter.map_or(true, |name| iface.name == name))
            .filter(NetworkInterface::is_usable)
            .collect();
        Self::new(selected)
    }

    /// Number of interfaces in the set.
    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    /// Returns `true` when no interface is usable.
    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    /// Iterates over the interfaces in name order.
    pub fn iter(&self) -> impl Iterator<Item = &NetworkInterface> {
        self.interfaces.iter()
    }

    /// Returns the interface names in name order.
    pub fn names(&self) -> Vec<&str> {
        self.interfaces.iter().map(|i| i.name.as_str()).collect()
    }

    /// Returns `true` when an interface called `name` is in the set.
    pub fn contains(&self, name: &str) -> bool {
        self.interfaces.iter().any(|i| i.name == name)
    }

    /// Returns `true` when this set has strictly more interfaces than
    /// `bound_count`, the size of the set the running instance was built with.
    pub fn has_grown_from(&self, bound_count: usize) -> bool {
        self.len() > bound_count
    }
}

impl FromIterator<NetworkInterface> for InterfaceSet {
    fn from_iter<T: IntoIterator<Item = NetworkInterface>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, up: bool, mtu: Option<u32>) -> NetworkInterface {
        NetworkInterface {
            name: name.to_string(),
            flags: InterfaceFlags {
                up,
                loopback: name == "lo",
                multicast: name != "lo",
            },
            mtu,
            addrs: Vec::new(),
        }
    }

    #[test]
    fn test_is_usable_requires_up_flag() {
        assert!(iface("eth0", true, Some(1500)).is_usable());
        assert!(!iface("eth0", false, Some(1500)).is_usable());
    }

    #[test]
    fn test_is_usable_rejects_zero_mtu() {
        assert!(!iface("tun0", true, Some(0)).is_usable());
    }

    #[test]
    fn test_is_usable_accepts_unknown_mtu() {
        assert!(iface("en0", true, None).is_usable());
    }

    #[test]
    fn test_select_usable_drops_down_interfaces() {
        // Arrange
        let candidates = vec![
            iface("lo", true, Some(65536)),
            iface("eth0", true, Some(1500)),
            iface("wlan0", false, Some(1500)),
        ];

        // Act
        let set = InterfaceSet::select_usable(candidates, None);

        // Assert
        assert_eq!(set.names(), vec!["eth0", "lo"]);
    }

    #[test]
    fn test_select_usable_applies_name_filter() {
        let candidates = vec![iface("eth0", true, Some(1500)), iface("eth1", true, Some(1500))];

        let set = InterfaceSet::select_usable(candidates, Some("eth1"));

        assert_eq!(set.len(), 1);
        assert!(set.contains("eth1"));
        assert!(!set.contains("eth0"));
    }

    #[test]
    fn test_select_usable_with_filter_on_down_interface_is_empty() {
        let candidates = vec![iface("eth0", false, Some(1500))];

        let set = InterfaceSet::select_usable(candidates, Some("eth0"));

        assert!(set.is_empty());
    }

    #[test]
    fn test_new_sorts_and_deduplicates_by_name() {
        let set = InterfaceSet::new(vec![
            iface("wlan0", true, None),
            iface("eth0", true, None),
            iface("wlan0", true, None),
        ]);

        assert_eq!(set.names(), vec!["eth0", "wlan0"]);
    }

    #[test]
    fn test_sets_from_different_enumeration_orders_are_equal() {
        let a: InterfaceSet = vec![iface("eth0", true, None), iface("eth1", true, None)]
            .into_iter()
            .collect();
        let b: InterfaceSet = vec![iface("eth1", true, None), iface("eth0", true, None)]
            .into_iter()
            .collect();

        assert_eq!(a, b);
    }

    #[test]
    fn test_has_grown_from_is_strict() {
        let set = InterfaceSet::new(vec![iface("eth0", true, None), iface("eth1", true, None)]);

        assert!(set.has_grown_from(1));
        assert!(!set.has_grown_from(2), "equal count must not count as growth");
        assert!(!set.has_grown_from(3), "shrinkage must not count as growth");
    }
}
