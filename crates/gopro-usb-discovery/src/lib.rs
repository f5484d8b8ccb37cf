//! gopro-usb Discovery
//!
//! Locates a USB-tethered camera and routes traffic to it:
//!
//! - **Presence**: scans the host USB device list for the camera vendor id and
//!   streams attach/detach events.
//!
//! - **mDNS/DNS-SD**: browses `_gopro-web._tcp.local.` and derives the camera's
//!   USB network address from the serial embedded in its instance name.
//!
//! - **Network binding**: picks the tethered interface and binds the process to it.
//!
//! Host facilities sit behind [`UsbEnumerator`], [`ServiceBrowser`] and
//! [`NetworkSelector`]; [`mock`] provides fakes for tests.

mod error;
mod mdns;
pub mod mock;
mod network;
mod session;
mod usb;

pub use error::{DiscoveryError, DiscoveryResult};
pub use mdns::{
    BrowseEvent, BrowseHandle, BrowseStream, MdnsBrowser, ServiceAdvertisement, ServiceBrowser,
    SERVICE_TYPE,
};
pub use network::{is_camera_subnet, select_network, HostNetwork, NetworkCandidate, NetworkSelector};
pub use session::{
    discover, CompletionLatch, DiscoveryOptions, DiscoveryOutcome, DiscoverySession, SessionState,
};
pub use usb::{
    check_presence, is_device_present, SysfsUsbEnumerator, UsbDeviceInfo, UsbEnumerator, UsbMonitor,
    UsbSubscription, GOPRO_VENDOR_ID,
};
