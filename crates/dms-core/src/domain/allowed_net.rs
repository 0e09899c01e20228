//! Allowed client IP networks.
//!
//! The serving component only accepts connections from peers inside one of
//! the configured networks.  The configuration carries them as a comma
//! separated list such as `192.168.1.0/24,10.0.0.7,fd00::/8`:
//!
//! - a CIDR entry is taken as-is (host bits are masked off);
//! - a bare address becomes a single-host network (`/32` or `/128`);
//! - an entry that parses as neither is logged and skipped;
//! - an empty list means "everyone": `0.0.0.0/0` and `::/0`.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

/// Error returned when an allowed-network expression cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllowedNetError {
    /// The address part is not an IPv4 or IPv6 address.
    #[error("invalid IP address in {0:?}")]
    InvalidAddress(String),
    /// The prefix length is not a number or exceeds the address width.
    #[error("invalid prefix length in {0:?}")]
    InvalidPrefix(String),
}

/// An IP network in CIDR form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllowedNet {
    network: IpAddr,
    prefix_len: u8,
}

impl AllowedNet {
    /// Builds a network, masking off host bits of `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`AllowedNetError::InvalidPrefix`] when `prefix_len` exceeds
    /// 32 for IPv4 or 128 for IPv6.
    pub fn new(addr: IpAddr, prefix_len: u8) -> Result<Self, AllowedNetError> {
        if prefix_len > max_prefix(&addr) {
            return Err(AllowedNetError::InvalidPrefix(format!("{addr}/{prefix_len}")));
        }
        Ok(Self {
            network: mask(addr, prefix_len),
            prefix_len,
        })
    }

    /// The whole IPv4 address space, `0.0.0.0/0`.
    pub fn any_v4() -> Self {
        Self {
            network: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            prefix_len: 0,
        }
    }

    /// The whole IPv6 address space, `::/0`.
    pub fn any_v6() -> Self {
        Self {
            network: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            prefix_len: 0,
        }
    }

    /// The masked network address.
    pub fn network(&self) -> IpAddr {
        self.network
    }

    /// The prefix length in bits.
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Returns `true` when `ip` lies inside this network.
    ///
    /// IPv4-mapped IPv6 peers (`::ffff:a.b.c.d`) are matched as IPv4.
    pub fn contains(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        match (self.network, ip) {
            (IpAddr::V4(_), IpAddr::V4(_)) | (IpAddr::V6(_), IpAddr::V6(_)) => {
                mask(ip, self.prefix_len) == self.network
            }
            _ => false,
        }
    }
}

impl FromStr for AllowedNet {
    type Err = AllowedNetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('/') {
            Some((addr, prefix)) => {
                let addr: IpAddr = addr
                    .parse()
                    .map_err(|_| AllowedNetError::InvalidAddress(s.to_string()))?;
                let prefix_len: u8 = prefix
                    .parse()
                    .map_err(|_| AllowedNetError::InvalidPrefix(s.to_string()))?;
                Self::new(addr, prefix_len)
            }
            None => {
                let addr: IpAddr = s
                    .parse()
                    .map_err(|_| AllowedNetError::InvalidAddress(s.to_string()))?;
                Self::new(addr, max_prefix(&addr))
            }
        }
    }
}

impl fmt::Display for AllowedNet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

/// Parses a comma separated list of networks.
///
/// Unparseable entries are logged and skipped.  An empty (or all-blank)
/// list yields `0.0.0.0/0` and `::/0`.
pub fn parse_allowed_nets(list: &str) -> Vec<AllowedNet> {
    if list.trim().is_empty() {
        return vec![AllowedNet::any_v4(), AllowedNet::any_v6()];
    }

    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.parse::<AllowedNet>() {
            Ok(net) => Some(net),
            Err(e) => {
                warn!("unable to parse allowed network expression: {e}");
                None
            }
        })
        .collect()
}

/// Returns `true` when `ip` is inside any of `nets`.
pub fn is_allowed(nets: &[AllowedNet], ip: IpAddr) -> bool {
    nets.iter().any(|net| net.contains(ip))
}

fn max_prefix(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn mask(addr: IpAddr, prefix_len: u8) -> IpAddr {
    match addr {
        IpAddr::V4(v4) => {
            let bits = u32::from(v4);
            let mask = u32::MAX.checked_shl(32 - u32::from(prefix_len)).unwrap_or(0);
            IpAddr::V4(Ipv4Addr::from(bits & mask))
        }
        IpAddr::V6(v6) => {
            let bits = u128::from(v6);
            let mask = u128::MAX.checked_shl(128 - u32::from(prefix_len)).unwrap_or(0);
            IpAddr::V6(Ipv6Addr::from(bits & mask))
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
