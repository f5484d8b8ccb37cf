//! USB presence detection for cameras
//!
//! Reads the host's USB device list (sysfs on Linux) and reports whether a device
//! with the camera vendor id is attached. [`UsbMonitor`] turns repeated scans into
//! attach/detach events for a single subscriber.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// USB vendor id assigned to GoPro
pub const GOPRO_VENDOR_ID: u16 = gopro_usb_core::config::DEFAULT_VENDOR_ID;

/// A USB device visible to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbDeviceInfo {
    /// Host-assigned bus path, e.g. `1-2.1`
    pub bus_id: String,
    pub vendor_id: u16,
    pub product_id: u16,
}

/// Source of the currently attached USB devices
pub trait UsbEnumerator: Send + Sync {
    fn devices(&self) -> Vec<UsbDeviceInfo>;
}

/// Whether any attached device carries `vendor_id`
pub fn is_device_present(enumerator: &dyn UsbEnumerator, vendor_id: u16) -> bool {
    let devices = enumerator.devices();
    debug!("USB: Checking {} device(s)", devices.len());

    devices.iter().any(|device| {
        trace!(
            "USB: Device {} - VendorID: 0x{:04x}, ProductID: 0x{:04x}",
            device.bus_id,
            device.vendor_id,
            device.product_id
        );
        device.vendor_id == vendor_id
    })
}

/// [`is_device_present`] run on the blocking pool
pub async fn check_presence(enumerator: Arc<dyn UsbEnumerator>, vendor_id: u16) -> bool {
    match tokio::task::spawn_blocking(move || is_device_present(enumerator.as_ref(), vendor_id)).await {
        Ok(present) => present,
        Err(e) => {
            warn!("USB: Presence scan failed: {}", e);
            false
        }
    }
}

/// [`UsbEnumerator`] over the Linux sysfs device tree
pub struct SysfsUsbEnumerator {
    root: PathBuf,
}

impl SysfsUsbEnumerator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_device(dir: &Path) -> Option<UsbDeviceInfo> {
        let vendor_id = read_hex(&dir.join("idVendor"))?;
        let product_id = read_hex(&dir.join("idProduct"))?;
        let bus_id = dir.file_name()?.to_string_lossy().into_owned();
        Some(UsbDeviceInfo {
            bus_id,
            vendor_id,
            product_id,
        })
    }
}

impl Default for SysfsUsbEnumerator {
    fn default() -> Self {
        Self::new("/sys/bus/usb/devices")
    }
}

impl UsbEnumerator for SysfsUsbEnumerator {
    fn devices(&self) -> Vec<UsbDeviceInfo> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("USB: Cannot read {:?}: {}", self.root, e);
                return Vec::new();
            }
        };

        // Interface entries (`1-2:1.0`) carry no idVendor and are skipped
        let mut devices: Vec<UsbDeviceInfo> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| Self::read_device(&entry.path()))
            .collect();
        devices.sort_by(|a, b| a.bus_id.cmp(&b.bus_id));
        devices
    }
}

fn read_hex(path: &Path) -> Option<u16> {
    let contents = std::fs::read_to_string(path).ok()?;
    u16::from_str_radix(contents.trim(), 16).ok()
}

/// Polls an enumerator and reports camera attach (`true`) and detach (`false`)
pub struct UsbMonitor;

impl UsbMonitor {
    /// Start watching; devices present now form the baseline and emit nothing
    pub fn subscribe(
        enumerator: Arc<dyn UsbEnumerator>,
        vendor_id: u16,
        poll_interval: Duration,
    ) -> UsbSubscription {
        let (tx, rx) = mpsc::channel(16);

        let task = tokio::spawn(async move {
            let mut known = matching_ids(&enumerator, vendor_id).await.unwrap_or_default();
            debug!("USB: Monitoring started with {} camera(s) attached", known.len());

            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(current) = matching_ids(&enumerator, vendor_id).await else {
                    continue;
                };

                for id in current.difference(&known) {
                    info!("USB: Camera attached at {}", id);
                    if tx.send(true).await.is_err() {
                        return;
                    }
                }
                for id in known.difference(&current) {
                    info!("USB: Camera detached from {}", id);
                    if tx.send(false).await.is_err() {
                        return;
                    }
                }

                known = current;
            }
        });

        UsbSubscription { events: rx, task }
    }
}

async fn matching_ids(enumerator: &Arc<dyn UsbEnumerator>, vendor_id: u16) -> Option<HashSet<String>> {
    let enumerator = enumerator.clone();
    let scan = tokio::task::spawn_blocking(move || {
        enumerator
            .devices()
            .into_iter()
            .filter(|d| d.vendor_id == vendor_id)
            .map(|d| d.bus_id)
            .collect()
    });
    match scan.await {
        Ok(ids) => Some(ids),
        Err(e) => {
            warn!("USB: Device scan failed: {}", e);
            None
        }
    }
}

/// A live attach/detach feed; dropping it stops the monitor
pub struct UsbSubscription {
    events: mpsc::Receiver<bool>,
    task: JoinHandle<()>,
}

impl UsbSubscription {
    /// Next attach/detach event
    pub async fn recv(&mut self) -> Option<bool> {
        self.events.recv().await
    }
}

impl Drop for UsbSubscription {
    fn drop(&mut self) {
        self.task.abort();
        debug!("USB: Monitoring stopped");
    }
}
