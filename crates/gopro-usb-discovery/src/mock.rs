//! Mock host facilities for unit testing.
//!
//! Stand-ins for the mDNS browser, USB device list and host network state so the
//! discovery session, presence check and prober can be driven without hardware.

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::mdns::{BrowseEvent, BrowseHandle, BrowseStream, ServiceAdvertisement, ServiceBrowser};
use crate::network::{NetworkCandidate, NetworkSelector};
use crate::usb::{UsbDeviceInfo, UsbEnumerator};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// A scripted [`ServiceBrowser`]
///
/// Each `browse` call replays, and consumes, the events scripted so far. Delays
/// are measured from the start of the browse.
pub struct MockBrowser {
    script: Mutex<Vec<(Duration, BrowseEvent)>>,
    start_error: Option<String>,
    stops: Arc<AtomicUsize>,
    browses: AtomicUsize,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Vec::new()),
            start_error: None,
            stops: Arc::new(AtomicUsize::new(0)),
            browses: AtomicUsize::new(0),
        }
    }

    /// A browser whose `browse` always fails to start
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            start_error: Some(reason.into()),
            ..Self::new()
        }
    }

    /// Script an advertisement with the given instance name
    pub fn advertise_after(&self, delay: Duration, name: &str) {
        let ad = ServiceAdvertisement::new(name, crate::mdns::SERVICE_TYPE);
        self.push(delay, BrowseEvent::Found(ad));
    }

    /// Script a browse failure
    pub fn fail_after(&self, delay: Duration, reason: &str) {
        self.push(delay, BrowseEvent::Failed(reason.to_string()));
    }

    fn push(&self, delay: Duration, event: BrowseEvent) {
        self.script.lock().expect("lock poisoned").push((delay, event));
    }

    /// Number of `stop` calls across all browses
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Number of `browse` calls
    pub fn browse_count(&self) -> usize {
        self.browses.load(Ordering::SeqCst)
    }
}

impl Default for MockBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceBrowser for MockBrowser {
    fn browse(&self, _service_type: &str) -> DiscoveryResult<BrowseStream> {
        self.browses.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.start_error {
            return Err(DiscoveryError::Platform(reason.clone()));
        }

        let mut script = std::mem::take(&mut *self.script.lock().expect("lock poisoned"));
        script.sort_by_key(|(delay, _)| *delay);

        let (tx, rx) = mpsc::channel(16);
        let start = tokio::time::Instant::now();
        tokio::spawn(async move {
            for (delay, event) in script {
                tokio::time::sleep_until(start + delay).await;
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            // Like a real browse, stay open until stopped
            tx.closed().await;
        });

        Ok(BrowseStream::new(rx, Box::new(MockHandle(self.stops.clone()))))
    }
}

struct MockHandle(Arc<AtomicUsize>);

impl BrowseHandle for MockHandle {
    fn stop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// A mutable USB device list
#[derive(Default)]
pub struct MockUsb {
    devices: Mutex<Vec<UsbDeviceInfo>>,
}

impl MockUsb {
    pub fn new(devices: Vec<UsbDeviceInfo>) -> Self {
        Self {
            devices: Mutex::new(devices),
        }
    }

    pub fn attach(&self, device: UsbDeviceInfo) {
        self.devices.lock().expect("lock poisoned").push(device);
    }

    pub fn detach(&self, bus_id: &str) {
        self.devices
            .lock()
            .expect("lock poisoned")
            .retain(|d| d.bus_id != bus_id);
    }
}

impl UsbEnumerator for MockUsb {
    fn devices(&self) -> Vec<UsbDeviceInfo> {
        self.devices.lock().expect("lock poisoned").clone()
    }
}

/// Fake host network state recording bind attempts
#[derive(Default)]
pub struct MockNetwork {
    candidates: Vec<NetworkCandidate>,
    rejected: HashSet<String>,
    attempts: Mutex<Vec<String>>,
    bound: Mutex<Option<String>>,
}

impl MockNetwork {
    pub fn new(candidates: Vec<NetworkCandidate>) -> Self {
        Self {
            candidates,
            ..Self::default()
        }
    }

    /// Make binds to `interface` fail
    pub fn reject(mut self, interface: &str) -> Self {
        self.rejected.insert(interface.to_string());
        self
    }

    /// Interfaces a bind was attempted on, in order
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().expect("lock poisoned").clone()
    }
}

impl NetworkSelector for MockNetwork {
    fn candidates(&self) -> Vec<NetworkCandidate> {
        self.candidates.clone()
    }

    fn bind(&self, candidate: &NetworkCandidate) -> DiscoveryResult<()> {
        let name = candidate.interface_name.clone();
        self.attempts.lock().expect("lock poisoned").push(name.clone());
        if self.rejected.contains(&name) {
            return Err(DiscoveryError::bind_failure(name, "rejected by mock"));
        }
        *self.bound.lock().expect("lock poisoned") = Some(name);
        Ok(())
    }

    fn bound_interface(&self) -> Option<String> {
        self.bound.lock().expect("lock poisoned").clone()
    }
}
