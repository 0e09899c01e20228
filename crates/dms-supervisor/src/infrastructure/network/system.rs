//! OS-backed interface enumeration.
//!
//! `get_if_addrs` reports one record per *address*, so an interface with an
//! IPv4 and an IPv6 address shows up twice, and an interface without any
//! address does not show up at all.  It also reports no flags or MTU.
//!
//! On Linux the interface list itself comes from sysfs, one directory per
//! interface whether it is up, down or unaddressed:
//!
//! ```text
//! /sys/class/net/eth0/flags   →  0x1003   (IFF_UP | IFF_BROADCAST | IFF_MULTICAST)
//! /sys/class/net/eth0/mtu     →  1500
//! ```
//!
//! Addresses from `get_if_addrs` are then merged in by interface name.  An
//! addressed interface without a readable sysfs entry is kept and taken to
//! be up.
//!
//! Elsewhere only interfaces with an address are listed; they are taken to be
//! up, with an unknown MTU.

use std::collections::BTreeMap;
use std::net::IpAddr;
#[cfg(target_os = "linux")]
use std::path::PathBuf;

use dms_core::{InterfaceFlags, NetworkInterface};
use tracing::debug;

use super::{InterfaceEnumerator, InterfaceLookupError};

/// Addresses grouped by interface name, with the loopback hint
/// `get_if_addrs` gives.
type AddressedInterfaces = BTreeMap<String, (bool, Vec<IpAddr>)>;

/// [`InterfaceEnumerator`] backed by the operating system.
#[derive(Debug, Clone)]
pub struct SystemInterfaceEnumerator {
    #[cfg(target_os = "linux")]
    sysfs_root: PathBuf,
}

impl SystemInterfaceEnumerator {
    /// Creates the enumerator.
    pub fn new() -> Self {
        Self {
            #[cfg(target_os = "linux")]
            sysfs_root: PathBuf::from(sysfs::DEFAULT_ROOT),
        }
    }

    /// Creates an enumerator that reads interface directories from `root`
    /// instead of `/sys/class/net`.
    #[cfg(target_os = "linux")]
    pub fn with_sysfs_root(root: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_root: root.into(),
        }
    }
}

impl Default for SystemInterfaceEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

impl InterfaceEnumerator for SystemInterfaceEnumerator {
    fn list_interfaces(&self) -> Result<Vec<NetworkInterface>, InterfaceLookupError> {
        let addressed = addresses_by_name()?;
        let interfaces = self.describe_all(addressed);
        debug!("OS reports {} interfaces", interfaces.len());
        Ok(interfaces)
    }
}

fn addresses_by_name() -> Result<AddressedInterfaces, InterfaceLookupError> {
    let raw = get_if_addrs::get_if_addrs().map_err(InterfaceLookupError::Enumerate)?;

    let mut by_name = AddressedInterfaces::new();
    for iface in raw {
        let loopback = iface.is_loopback();
        let ip = iface.ip();
        let entry = by_name.entry(iface.name).or_insert((loopback, Vec::new()));
        entry.0 |= loopback;
        entry.1.push(ip);
    }
    Ok(by_name)
}

impl SystemInterfaceEnumerator {
    #[cfg(target_os = "linux")]
    fn describe_all(&self, mut addressed: AddressedInterfaces) -> Vec<NetworkInterface> {
        // BTreeMap keeps the output sorted by name.
        let mut interfaces: BTreeMap<String, NetworkInterface> = BTreeMap::new();

        match sysfs::list(&self.sysfs_root) {
            Ok(names) => {
                for name in names {
                    let Some((raw_flags, mtu)) = sysfs::read(&self.sysfs_root, &name) else {
                        debug!("unreadable sysfs entry for {name}; skipping it");
                        continue;
                    };
                    let addrs = addressed
                        .remove(&name)
                        .map(|(_, addrs)| addrs)
                        .unwrap_or_default();
                    interfaces.insert(
                        name.clone(),
                        NetworkInterface {
                            name,
                            flags: sysfs::decode_flags(raw_flags),
                            mtu: Some(mtu),
                            addrs,
                        },
                    );
                }
            }
            Err(e) => debug!(
                "cannot list {}: {e}; using address records only",
                self.sysfs_root.display()
            ),
        }

        for (name, (loopback, addrs)) in addressed {
            debug!("no sysfs entry for {name}; assuming it is up");
            interfaces.insert(name.clone(), assumed_up(name, loopback, addrs));
        }
        interfaces.into_values().collect()
    }

    #[cfg(not(target_os = "linux"))]
    fn describe_all(&self, addressed: AddressedInterfaces) -> Vec<NetworkInterface> {
        addressed
            .into_iter()
            .map(|(name, (loopback, addrs))| assumed_up(name, loopback, addrs))
            .collect()
    }
}

/// An interface known only from its addresses.
fn assumed_up(name: String, loopback: bool, addrs: Vec<IpAddr>) -> NetworkInterface {
    NetworkInterface {
        name,
        flags: InterfaceFlags {
            up: true,
            loopback,
            multicast: !loopback,
        },
        mtu: None,
        addrs,
    }
}

#[cfg(target_os = "linux")]
mod sysfs {
    use std::io;
    use std::path::Path;

    use dms_core::InterfaceFlags;

    pub(super) const DEFAULT_ROOT: &str = "/sys/class/net";

    const IFF_UP: u32 = 0x1;
    const IFF_LOOPBACK: u32 = 0x8;
    const IFF_MULTICAST: u32 = 0x1000;

    /// Names of every interface directory under `root`.
    pub(super) fn list(root: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(root)? {
            if let Ok(name) = entry?.file_name().into_string() {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Reads the raw flags word and the MTU of `name`.
    pub(super) fn read(root: &Path, name: &str) -> Option<(u32, u32)> {
        let dir = root.join(name);
        let flags = parse_flags(&std::fs::read_to_string(dir.join("flags")).ok()?)?;
        let mtu = std::fs::read_to_string(dir.join("mtu"))
            .ok()?
            .trim()
            .parse()
            .ok()?;
        Some((flags, mtu))
    }

    /// Parses the `0x…` hex word sysfs uses for interface flags.
    pub(super) fn parse_flags(raw: &str) -> Option<u32> {
        let raw = raw.trim();
        let hex = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .unwrap_or(raw);
        u32::from_str_radix(hex, 16).ok()
    }

    pub(super) fn decode_flags(raw: u32) -> InterfaceFlags {
        InterfaceFlags {
            up: raw & IFF_UP != 0,
            loopback: raw & IFF_LOOPBACK != 0,
            multicast: raw & IFF_MULTICAST != 0,
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_parse_flags_reads_hex_with_prefix_and_newline() {
            assert_eq!(parse_flags("0x1003\n"), Some(0x1003));
        }

        #[test]
        fn test_parse_flags_rejects_garbage() {
            assert_eq!(parse_flags("up"), None);
        }

        #[test]
        fn test_decode_flags_for_ethernet_interface() {
            // Arrange: IFF_UP | IFF_BROADCAST | IFF_MULTICAST
            let raw = 0x1003;

            // Act
            let flags = decode_flags(raw);

            // Assert
            assert!(flags.up);
            assert!(!flags.loopback);
            assert!(flags.multicast);
        }

        #[test]
        fn test_decode_flags_for_downed_interface() {
            let flags = decode_flags(0x1002);

            assert!(!flags.up);
        }

        #[test]
        fn test_decode_flags_for_loopback() {
            let flags = decode_flags(0x9);

            assert!(flags.up && flags.loopback);
        }
    }
}
