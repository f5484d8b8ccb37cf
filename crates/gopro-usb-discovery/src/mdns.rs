//! mDNS/DNS-SD browsing for camera advertisements
//!
//! Browses the local network using mDNS (Bonjour/Avahi) for the camera's web API
//! service and forwards every advertisement it sees to the discovery session.

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::network::NetworkSelector;
use mdns_sd::{IfKind, ServiceDaemon, ServiceEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Service type for the camera's web API advertisement
pub const SERVICE_TYPE: &str = gopro_usb_core::config::DEFAULT_SERVICE_TYPE;

/// How often the forwarder thread checks whether the session went away
const FORWARD_POLL: Duration = Duration::from_millis(200);

/// A service seen on the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAdvertisement {
    /// Instance name, e.g. `GoPro-C3601370011883`
    pub name: String,
    /// Service type the advertisement was found under
    pub service_type: String,
}

impl ServiceAdvertisement {
    pub fn new(name: impl Into<String>, service_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service_type: service_type.into(),
        }
    }

    /// Build from an mDNS fullname (`<instance>.<service type>`)
    pub fn from_fullname(fullname: &str, service_type: &str) -> Self {
        let name = fullname
            .strip_suffix(service_type)
            .map(|n| n.strip_suffix('.').unwrap_or(n))
            .unwrap_or(fullname);
        Self::new(name, service_type)
    }
}

/// Notification delivered by a [`ServiceBrowser`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseEvent {
    Found(ServiceAdvertisement),
    Failed(String),
}

/// Stops an in-progress browse
///
/// Implementations must tolerate `stop` being called more than once.
pub trait BrowseHandle: Send {
    fn stop(&mut self);
}

/// Stream of browse events with the handle that ends it
pub struct BrowseStream {
    events: mpsc::Receiver<BrowseEvent>,
    handle: Box<dyn BrowseHandle>,
}

impl BrowseStream {
    pub fn new(events: mpsc::Receiver<BrowseEvent>, handle: Box<dyn BrowseHandle>) -> Self {
        Self { events, handle }
    }

    /// Next event, `None` once the browser closed the stream
    pub async fn next(&mut self) -> Option<BrowseEvent> {
        self.events.recv().await
    }

    pub fn stop(&mut self) {
        self.handle.stop();
        self.events.close();
    }
}

impl Drop for BrowseStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Local-network service discovery facility
pub trait ServiceBrowser: Send + Sync {
    /// Start browsing for `service_type`
    fn browse(&self, service_type: &str) -> DiscoveryResult<BrowseStream>;
}

/// [`ServiceBrowser`] backed by `mdns-sd`
///
/// Every browse runs on its own daemon, so concurrent sessions for the same
/// service type never share a querier. When a network selector is attached, each
/// daemon only uses the interface the process is bound to.
#[derive(Default)]
pub struct MdnsBrowser {
    network: Option<Arc<dyn NetworkSelector>>,
}

impl MdnsBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict browsing to the interface bound through `network`
    pub fn with_network(mut self, network: Arc<dyn NetworkSelector>) -> Self {
        self.network = Some(network);
        self
    }

    /// Interface the next browse is restricted to, `None` for all interfaces
    pub fn interface(&self) -> Option<String> {
        self.network.as_ref().and_then(|n| n.bound_interface())
    }

    fn start_daemon(&self) -> DiscoveryResult<ServiceDaemon> {
        let daemon = ServiceDaemon::new().map_err(|e| DiscoveryError::Mdns(e.to_string()))?;

        if let Some(interface) = self.interface() {
            debug!("mDNS: Restricting daemon to {}", interface);
            let scoped = daemon
                .disable_interface(IfKind::All)
                .and_then(|_| daemon.enable_interface(IfKind::Name(interface)));
            if let Err(e) = scoped {
                let _ = daemon.shutdown();
                return Err(DiscoveryError::Mdns(e.to_string()));
            }
        }

        Ok(daemon)
    }
}

impl ServiceBrowser for MdnsBrowser {
    fn browse(&self, service_type: &str) -> DiscoveryResult<BrowseStream> {
        let daemon = self.start_daemon()?;
        let mut handle = MdnsBrowseHandle {
            daemon,
            stopped: false,
        };

        let receiver = match handle.daemon.browse(service_type) {
            Ok(receiver) => receiver,
            Err(e) => {
                handle.stop();
                return Err(DiscoveryError::Mdns(e.to_string()));
            }
        };

        let (tx, rx) = mpsc::channel(32);
        let ty = service_type.to_string();

        // mdns-sd hands out a blocking receiver; forward it from a plain thread
        std::thread::Builder::new()
            .name("mdns-browse".to_string())
            .spawn(move || loop {
                match receiver.recv_timeout(FORWARD_POLL) {
                    Ok(ServiceEvent::SearchStarted(_)) => {
                        debug!("mDNS: Browsing for {}", ty);
                    }
                    Ok(ServiceEvent::ServiceFound(_, fullname)) => {
                        debug!("mDNS: Service found: {}", fullname);
                        let ad = ServiceAdvertisement::from_fullname(&fullname, &ty);
                        if tx.blocking_send(BrowseEvent::Found(ad)).is_err() {
                            break;
                        }
                    }
                    Ok(ServiceEvent::ServiceRemoved(_, fullname)) => {
                        debug!("mDNS: Service lost: {}", fullname);
                    }
                    Ok(ServiceEvent::SearchStopped(_)) => {
                        debug!("mDNS: Browse stopped for {}", ty);
                        break;
                    }
                    Ok(_) => {}
                    Err(_) if tx.is_closed() => break,
                    Err(_) if receiver.is_disconnected() => {
                        let _ = tx.blocking_send(BrowseEvent::Failed("mDNS daemon disconnected".into()));
                        break;
                    }
                    Err(_) => {}
                }
            })?;

        info!("mDNS: Started browsing for {}", service_type);

        Ok(BrowseStream::new(rx, Box::new(handle)))
    }
}

/// Owns the daemon of a single browse
struct MdnsBrowseHandle {
    daemon: ServiceDaemon,
    stopped: bool,
}

impl BrowseHandle for MdnsBrowseHandle {
    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        match self.daemon.shutdown() {
            Ok(_) => debug!("mDNS: Browse daemon shut down"),
            Err(e) => warn!("mDNS: Error stopping browse: {}", e),
        }
    }
}

impl Drop for MdnsBrowseHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockNetwork;
    use crate::network::{select_network, NetworkCandidate};
    use crate::session::{DiscoveryOptions, DiscoveryOutcome, DiscoverySession};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A service type nothing on the network advertises
    const QUIET_SERVICE: &str = "_gopro-usb-quiet._tcp.local.";

    #[test]
    fn test_advertisement_from_fullname() {
        let ad = ServiceAdvertisement::from_fullname(
            "GoPro-C3601370011883._gopro-web._tcp.local.",
            SERVICE_TYPE,
        );
        assert_eq!(ad.name, "GoPro-C3601370011883");
        assert_eq!(ad.service_type, SERVICE_TYPE);
    }

    #[test]
    fn test_advertisement_from_foreign_fullname() {
        let ad = ServiceAdvertisement::from_fullname("printer._ipp._tcp.local.", SERVICE_TYPE);
        assert_eq!(ad.name, "printer._ipp._tcp.local.");
    }

    struct CountingHandle(Arc<AtomicUsize>);

    impl BrowseHandle for CountingHandle {
        fn stop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_stream_stop_closes_events() {
        let stops = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel(4);
        let mut stream = BrowseStream::new(rx, Box::new(CountingHandle(stops.clone())));

        stream.stop();
        assert!(tx.send(BrowseEvent::Failed("late".into())).await.is_err());
        assert!(stream.next().await.is_none());

        drop(stream);
        // The handle decides whether repeat stops matter; the stream forwards each one
        assert_eq!(stops.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_browses_are_independent() {
        let browser = MdnsBrowser::new();
        let mut first = browser.browse(QUIET_SERVICE).unwrap();
        let mut second = browser.browse(QUIET_SERVICE).unwrap();

        first.stop();
        drop(first);

        let pending = tokio::time::timeout(Duration::from_millis(500), second.next()).await;
        assert!(pending.is_err(), "second browse ended early: {:?}", pending);
        second.stop();
    }

    #[tokio::test]
    async fn test_cancelled_session_leaves_other_running() {
        let browser: Arc<dyn ServiceBrowser> = Arc::new(MdnsBrowser::new());
        let options = DiscoveryOptions {
            service_type: QUIET_SERVICE.to_string(),
            timeout: Duration::from_millis(600),
            ..DiscoveryOptions::default()
        };

        let mut a = DiscoverySession::start(browser.clone(), options.clone());
        let mut b = DiscoverySession::start(browser, options);
        tokio::time::sleep(Duration::from_millis(50)).await;
        a.cancel();

        let started = std::time::Instant::now();
        assert_eq!(b.outcome().await, DiscoveryOutcome::TimedOut(None));
        assert!(started.elapsed() >= Duration::from_millis(400));
    }

    #[test]
    fn test_browse_follows_bound_interface() {
        let network = Arc::new(MockNetwork::new(vec![
            NetworkCandidate::new("rmnet0", vec![], true),
            NetworkCandidate::new("usb0", vec![], false),
        ]));
        let browser = MdnsBrowser::new().with_network(network.clone());
        assert!(browser.interface().is_none());

        assert!(select_network(network.as_ref()));
        assert_eq!(browser.interface().as_deref(), Some("usb0"));
    }

    #[tokio::test]
    async fn test_browse_starts_on_scoped_daemon() {
        let network = Arc::new(MockNetwork::new(vec![NetworkCandidate::new("usb0", vec![], false)]));
        assert!(select_network(network.as_ref()));

        let browser = MdnsBrowser::new().with_network(network);
        let mut stream = browser.browse(QUIET_SERVICE).unwrap();
        let pending = tokio::time::timeout(Duration::from_millis(200), stream.next()).await;
        assert!(pending.is_err());
    }
}
