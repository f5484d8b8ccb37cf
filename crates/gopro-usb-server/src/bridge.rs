//! Method dispatch for the camera bridge
//!
//! Wraps the three device operations behind the channel's method names. Every
//! failure is absorbed here and reported as `false` or `null`.

use gopro_usb_core::{Config, Method, MethodResponse};
use gopro_usb_discovery::{
    check_presence, discover, select_network, DiscoveryOptions, NetworkSelector,
    ServiceBrowser, UsbEnumerator, UsbMonitor, UsbSubscription,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The host facilities and settings behind the message channel
pub struct GoProBridge {
    config: Config,
    usb: Arc<dyn UsbEnumerator>,
    browser: Arc<dyn ServiceBrowser>,
    network: Arc<dyn NetworkSelector>,
}

impl GoProBridge {
    pub fn new(
        config: Config,
        usb: Arc<dyn UsbEnumerator>,
        browser: Arc<dyn ServiceBrowser>,
        network: Arc<dyn NetworkSelector>,
    ) -> Self {
        Self {
            config,
            usb,
            browser,
            network,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether a camera is attached over USB
    pub async fn is_connected(&self) -> bool {
        let connected = check_presence(self.usb.clone(), self.config.vendor_id).await;
        info!("isGoProConnected: {}", connected);
        connected
    }

    /// Browse for the camera and return its address
    pub async fn discover_ip(&self) -> Option<String> {
        let options = DiscoveryOptions::from(&self.config);
        debug!("discoverGoProIP: {:?}", options);
        let address = discover(self.browser.clone(), options).await;
        info!("discoverGoProIP: {:?}", address);
        address
    }

    /// Bind the process to the camera's network
    pub async fn bind_network(&self) -> bool {
        let network = self.network.clone();
        // Interface enumeration and bind probes are blocking syscalls
        match tokio::task::spawn_blocking(move || select_network(network.as_ref())).await {
            Ok(bound) => {
                info!("bindToGoProNetwork: {}", bound);
                bound
            }
            Err(e) => {
                warn!("bindToGoProNetwork: Selection task failed: {}", e);
                false
            }
        }
    }

    /// Interface the process is currently bound to
    pub fn bound_interface(&self) -> Option<String> {
        self.network.bound_interface()
    }

    /// Start a private attach/detach feed
    pub fn subscribe_events(&self) -> UsbSubscription {
        UsbMonitor::subscribe(
            self.usb.clone(),
            self.config.vendor_id,
            self.config.usb_poll_interval(),
        )
    }

    /// Handle a call by method name
    pub async fn call(&self, method: &str) -> MethodResponse {
        match method.parse::<Method>() {
            Ok(method) => self.invoke(method).await,
            Err(e) => {
                warn!("{}", e);
                MethodResponse::not_implemented(method)
            }
        }
    }

    pub async fn invoke(&self, method: Method) -> MethodResponse {
        let result = match method {
            Method::IsGoProConnected => Value::Bool(self.is_connected().await),
            Method::DiscoverGoProIp => self.discover_ip().await.map_or(Value::Null, Value::String),
            Method::BindToGoProNetwork => Value::Bool(self.bind_network().await),
        };
        MethodResponse::success(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gopro_usb_discovery::mock::{MockBrowser, MockNetwork, MockUsb};
    use gopro_usb_discovery::{NetworkCandidate, UsbDeviceInfo, GOPRO_VENDOR_ID};
    use serde_json::json;
    use std::time::Duration;

    fn camera() -> UsbDeviceInfo {
        UsbDeviceInfo {
            bus_id: "1-2".to_string(),
            vendor_id: GOPRO_VENDOR_ID,
            product_id: 0x0059,
        }
    }

    fn bridge(config: Config, usb: MockUsb, browser: Arc<MockBrowser>, network: MockNetwork) -> GoProBridge {
        GoProBridge::new(config, Arc::new(usb), browser, Arc::new(network))
    }

    #[tokio::test]
    async fn test_is_connected() {
        let b = bridge(
            Config::default(),
            MockUsb::new(vec![camera()]),
            Arc::new(MockBrowser::new()),
            MockNetwork::default(),
        );
        assert_eq!(b.call("isGoProConnected").await, MethodResponse::success(true));

        let b = bridge(
            Config::default(),
            MockUsb::default(),
            Arc::new(MockBrowser::new()),
            MockNetwork::default(),
        );
        assert_eq!(b.call("isGoProConnected").await, MethodResponse::success(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_discover_resolves() {
        let browser = Arc::new(MockBrowser::new());
        browser.advertise_after(Duration::from_millis(20), "GoPro-C3601370011883");
        let b = bridge(Config::default(), MockUsb::default(), browser, MockNetwork::default());

        assert_eq!(
            b.call("discoverGoProIP").await,
            MethodResponse::success(json!("172.28.183.51"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_discover_timeout_is_null_or_fallback() {
        let browser = Arc::new(MockBrowser::new());
        browser.advertise_after(Duration::from_millis(20), "GoPro-short");
        let b = bridge(Config::default(), MockUsb::default(), browser.clone(), MockNetwork::default());
        assert_eq!(b.call("discoverGoProIP").await, MethodResponse::success(Value::Null));

        let b = bridge(
            Config::default().with_default_fallback(),
            MockUsb::default(),
            browser,
            MockNetwork::default(),
        );
        assert_eq!(
            b.call("discoverGoProIP").await,
            MethodResponse::success(json!("172.28.183.51"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_discover_platform_error_is_null() {
        let b = bridge(
            Config::default(),
            MockUsb::default(),
            Arc::new(MockBrowser::failing("daemon unavailable")),
            MockNetwork::default(),
        );
        assert_eq!(b.invoke(Method::DiscoverGoProIp).await, MethodResponse::success(Value::Null));
    }

    #[tokio::test]
    async fn test_bind_network() {
        let network = MockNetwork::new(vec![
            NetworkCandidate::new("cellular0", vec![], true),
            NetworkCandidate::new("usb0", vec![], false),
        ]);
        let b = bridge(Config::default(), MockUsb::default(), Arc::new(MockBrowser::new()), network);

        assert_eq!(b.call("bindToGoProNetwork").await, MethodResponse::success(true));
        assert_eq!(b.bound_interface().as_deref(), Some("usb0"));
    }

    #[tokio::test]
    async fn test_bind_network_failure_is_false() {
        let network = MockNetwork::new(vec![NetworkCandidate::new("rmnet0", vec![], true)]);
        let b = bridge(Config::default(), MockUsb::default(), Arc::new(MockBrowser::new()), network);

        assert_eq!(b.call("bindToGoProNetwork").await, MethodResponse::success(false));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let b = bridge(
            Config::default(),
            MockUsb::default(),
            Arc::new(MockBrowser::new()),
            MockNetwork::default(),
        );
        assert_eq!(b.call("formatSdCard").await, MethodResponse::not_implemented("formatSdCard"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_subscription() {
        let usb = Arc::new(MockUsb::default());
        let b = GoProBridge::new(
            Config::default().with_usb_poll_interval(Duration::from_millis(50)),
            usb.clone(),
            Arc::new(MockBrowser::new()),
            Arc::new(MockNetwork::default()),
        );

        let mut events = b.subscribe_events();
        tokio::time::sleep(Duration::from_millis(10)).await;
        usb.attach(camera());
        assert_eq!(events.recv().await, Some(true));
    }
}
