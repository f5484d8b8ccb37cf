//! Network interface selection for the camera's USB network
//!
//! The camera shows up as a tethered Ethernet-style interface (RNDIS/NCM) on a
//! `172.2X.1YZ.0/24` subnet. [`select_network`] picks that interface, or failing
//! that any non-cellular one, and binds the process to it.
//!
//! The binding is process-wide: once set, every mDNS browse started through an
//! [`MdnsBrowser`](crate::MdnsBrowser) sharing the selector runs only on the
//! chosen interface until rebound.

use crate::error::{DiscoveryError, DiscoveryResult};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::RwLock;
use tracing::{debug, info, warn};

/// Interface name fragments used by USB tethering drivers
const TETHER_NAME_HINTS: [&str; 4] = ["usb", "rndis", "ncm", "eth"];

/// Interface name prefixes used by cellular modems
const CELLULAR_NAME_PREFIXES: [&str; 5] = ["rmnet", "wwan", "ccmni", "pdp", "cell"];

/// A host network interface as seen by the prober
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkCandidate {
    pub interface_name: String,
    pub addresses: Vec<IpAddr>,
    pub is_cellular: bool,
}

impl NetworkCandidate {
    pub fn new(interface_name: impl Into<String>, addresses: Vec<IpAddr>, is_cellular: bool) -> Self {
        Self {
            interface_name: interface_name.into(),
            addresses,
            is_cellular,
        }
    }

    /// Name suggests a USB tethering interface
    pub fn has_tether_name(&self) -> bool {
        let name = self.interface_name.to_lowercase();
        TETHER_NAME_HINTS.iter().any(|hint| name.contains(hint))
    }

    /// Carries an address on a camera USB subnet
    pub fn has_camera_address(&self) -> bool {
        self.addresses.iter().any(is_camera_subnet)
    }

    pub fn looks_like_camera_link(&self) -> bool {
        self.has_tether_name() || self.has_camera_address()
    }
}

/// Whether `ip` is inside a `172.2X.1YZ.0/24` camera subnet
pub fn is_camera_subnet(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            a == 172 && (20..=29).contains(&b) && (100..=199).contains(&c)
        }
        IpAddr::V6(_) => false,
    }
}

/// Host interface introspection plus the process-wide bind primitive
///
/// Passed explicitly to callers so tests can substitute a fake.
pub trait NetworkSelector: Send + Sync {
    fn candidates(&self) -> Vec<NetworkCandidate>;

    /// Bind all subsequent process traffic to `candidate`
    fn bind(&self, candidate: &NetworkCandidate) -> DiscoveryResult<()>;

    fn bound_interface(&self) -> Option<String>;
}

/// Bind to the interface most likely to reach the camera
///
/// Returns false when no candidate could be bound. Individual bind failures are
/// logged and the next candidate is tried.
pub fn select_network(selector: &dyn NetworkSelector) -> bool {
    let candidates = selector.candidates();
    info!("Network: Found {} interface(s), scanning for camera link", candidates.len());

    for candidate in &candidates {
        debug!(
            "Network: Interface {} {:?}{}",
            candidate.interface_name,
            candidate.addresses,
            if candidate.is_cellular { " (cellular)" } else { "" }
        );
    }

    let camera_links = candidates.iter().filter(|c| c.looks_like_camera_link());
    if try_bind(selector, camera_links) {
        return true;
    }

    info!("Network: No explicit camera link bound, trying non-cellular interfaces");
    let fallbacks = candidates.iter().filter(|c| !c.is_cellular);
    if try_bind(selector, fallbacks) {
        return true;
    }

    warn!("Network: Could not bind to any interface");
    false
}

fn try_bind<'a>(
    selector: &dyn NetworkSelector,
    candidates: impl Iterator<Item = &'a NetworkCandidate>,
) -> bool {
    for candidate in candidates {
        match selector.bind(candidate) {
            Ok(()) => {
                info!("Network: Bound to {}", candidate.interface_name);
                return true;
            }
            Err(e) => {
                warn!("Network: {}", e);
            }
        }
    }
    false
}

/// [`NetworkSelector`] over the host's real interfaces
#[derive(Default)]
pub struct HostNetwork {
    bound: RwLock<Option<String>>,
}

impl HostNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn interfaces() -> DiscoveryResult<Vec<NetworkCandidate>> {
        let mut by_name: BTreeMap<String, Vec<IpAddr>> = BTreeMap::new();
        for iface in if_addrs::get_if_addrs()? {
            if iface.is_loopback() {
                continue;
            }
            by_name.entry(iface.name.clone()).or_default().push(iface.ip());
        }

        Ok(by_name
            .into_iter()
            .map(|(name, addresses)| {
                let is_cellular = is_cellular_name(&name);
                NetworkCandidate::new(name, addresses, is_cellular)
            })
            .collect())
    }
}

impl NetworkSelector for HostNetwork {
    fn candidates(&self) -> Vec<NetworkCandidate> {
        match Self::interfaces() {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Network: Failed to list interfaces: {}", e);
                Vec::new()
            }
        }
    }

    fn bind(&self, candidate: &NetworkCandidate) -> DiscoveryResult<()> {
        let name = &candidate.interface_name;

        // The interface may have gone away since enumeration
        let present = Self::interfaces()?
            .iter()
            .any(|c| &c.interface_name == name);
        if !present {
            return Err(DiscoveryError::bind_failure(name, "interface no longer present"));
        }

        let probe = socket2::Socket::new(socket2::Domain::IPV4, socket2::Type::DGRAM, None)?;
        bind_socket(&probe, name)?;

        if let Ok(mut guard) = self.bound.write() {
            *guard = Some(name.clone());
        }
        Ok(())
    }

    fn bound_interface(&self) -> Option<String> {
        self.bound.read().ok().and_then(|g| g.clone())
    }
}

fn is_cellular_name(name: &str) -> bool {
    let name = name.to_lowercase();
    CELLULAR_NAME_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn bind_socket(socket: &socket2::Socket, interface: &str) -> DiscoveryResult<()> {
    socket
        .bind_device(Some(interface.as_bytes()))
        .map_err(|e| DiscoveryError::bind_failure(interface, e.to_string()))
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn bind_socket(_socket: &socket2::Socket, interface: &str) -> DiscoveryResult<()> {
    Err(DiscoveryError::bind_failure(
        interface,
        "interface binding is not supported on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockNetwork;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_camera_subnet() {
        assert!(is_camera_subnet(&ip("172.28.183.50")));
        assert!(is_camera_subnet(&ip("172.20.100.1")));
        assert!(!is_camera_subnet(&ip("172.30.183.50")));
        assert!(!is_camera_subnet(&ip("172.28.83.50")));
        assert!(!is_camera_subnet(&ip("192.168.1.10")));
        assert!(!is_camera_subnet(&ip("fe80::1")));
    }

    #[test]
    fn test_prefers_usb_over_cellular() {
        let network = MockNetwork::new(vec![
            NetworkCandidate::new("cellular0", vec![ip("10.0.0.2")], true),
            NetworkCandidate::new("usb0", vec![ip("172.28.183.50")], false),
        ]);

        assert!(select_network(&network));
        assert_eq!(network.bound_interface().as_deref(), Some("usb0"));
        assert_eq!(network.attempts(), vec!["usb0".to_string()]);
    }

    #[test]
    fn test_matches_camera_address_on_odd_name() {
        let network = MockNetwork::new(vec![
            NetworkCandidate::new("wlan0", vec![ip("192.168.1.4")], false),
            NetworkCandidate::new("bridge7", vec![ip("172.25.190.50")], false),
        ]);

        assert!(select_network(&network));
        assert_eq!(network.bound_interface().as_deref(), Some("bridge7"));
    }

    #[test]
    fn test_bind_failure_moves_on() {
        let network = MockNetwork::new(vec![
            NetworkCandidate::new("rndis0", vec![], false),
            NetworkCandidate::new("ncm0", vec![], false),
        ])
        .reject("rndis0");

        assert!(select_network(&network));
        assert_eq!(network.bound_interface().as_deref(), Some("ncm0"));
        assert_eq!(network.attempts(), vec!["rndis0".to_string(), "ncm0".to_string()]);
    }

    #[test]
    fn test_falls_back_to_non_cellular() {
        let network = MockNetwork::new(vec![
            NetworkCandidate::new("rmnet0", vec![ip("10.0.0.2")], true),
            NetworkCandidate::new("wlan0", vec![ip("192.168.1.4")], false),
        ]);

        assert!(select_network(&network));
        assert_eq!(network.bound_interface().as_deref(), Some("wlan0"));
    }

    #[test]
    fn test_nothing_bindable() {
        let network = MockNetwork::new(vec![
            NetworkCandidate::new("rmnet0", vec![ip("10.0.0.2")], true),
            NetworkCandidate::new("usb0", vec![], false),
        ])
        .reject("usb0");

        assert!(!select_network(&network));
        assert!(network.bound_interface().is_none());
        assert!(!select_network(&MockNetwork::default()));
    }

    #[test]
    fn test_cellular_names() {
        assert!(is_cellular_name("rmnet_data0"));
        assert!(is_cellular_name("wwan0"));
        assert!(!is_cellular_name("eth0"));
        assert!(!is_cellular_name("usb0"));
    }

    #[test]
    fn test_host_bind_rejects_unknown_interface() {
        let host = HostNetwork::new();
        let ghost = NetworkCandidate::new("gopro-does-not-exist0", vec![], false);

        assert!(host.bind(&ghost).is_err());
        assert!(host.bound_interface().is_none());
    }
}
