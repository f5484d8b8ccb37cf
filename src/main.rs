//! gopro-usb - host bridge for a USB-tethered GoPro
//!
//! Detects the camera on USB, locates its address through mDNS, binds the
//! process to its network and serves all three over a local message channel.

use anyhow::Result;
use clap::Parser;
use gopro_usb_core::{Config, FALLBACK_ADDRESS};
use gopro_usb_discovery::{check_presence, HostNetwork, MdnsBrowser, SysfsUsbEnumerator};
use gopro_usb_server::{create_router, AppState, GoProBridge};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

/// gopro-usb - Detect, locate and bind to a USB-connected GoPro
#[derive(Parser, Debug)]
#[command(name = "gopro-usb")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a JSON configuration file (default: ~/.config/gopro-usb/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Channel server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Channel server listen address
    #[arg(long)]
    bind: Option<String>,

    /// mDNS service type to browse
    #[arg(long)]
    service_type: Option<String>,

    /// Discovery timeout in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Only accept advertisements whose name contains this marker (case-insensitive)
    #[arg(long)]
    product_marker: Option<String>,

    /// Address reported when discovery times out
    #[arg(long, conflicts_with = "no_fallback")]
    fallback_address: Option<String>,

    /// Use the well-known camera address when discovery times out
    #[arg(long, conflicts_with_all = ["fallback_address", "no_fallback"])]
    default_fallback: bool,

    /// Report no result when discovery times out
    #[arg(long)]
    no_fallback: bool,

    /// Skip serials that do not yield a valid IPv4 address
    #[arg(long)]
    strict_address: bool,

    /// Sysfs USB device directory
    #[arg(long)]
    sysfs_root: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Apply command line overrides on top of the loaded configuration
    fn apply(&self, mut config: Config) -> Config {
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if let Some(bind) = &self.bind {
            config = config.with_bind_address(bind.clone());
        }
        if let Some(service_type) = &self.service_type {
            config = config.with_service_type(service_type.clone());
        }
        if let Some(secs) = self.timeout {
            config = config.with_discovery_timeout(Duration::from_secs(secs));
        }
        if self.product_marker.is_some() {
            config = config.with_product_marker(self.product_marker.clone());
        }
        if self.fallback_address.is_some() {
            config = config.with_timeout_fallback(self.fallback_address.clone());
        } else if self.default_fallback {
            config = config.with_timeout_fallback(Some(FALLBACK_ADDRESS.to_string()));
        } else if self.no_fallback {
            config = config.with_timeout_fallback(None);
        }
        if self.strict_address {
            config = config.with_strict_address(true);
        }
        if let Some(root) = &self.sysfs_root {
            config = config.with_sysfs_root(root.clone());
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(log_level.into())
                .add_directive("mdns_sd=warn".parse()?),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    info!("gopro-usb v{}", env!("CARGO_PKG_VERSION"));

    let config = args.apply(Config::load_or_default(args.config.as_deref()));
    config.validate()?;

    match &config.timeout_fallback {
        Some(fallback) => info!("Discovery: Timeout reports fallback {}", fallback),
        None => info!("Discovery: Timeout reports no result"),
    }

    let usb = Arc::new(SysfsUsbEnumerator::new(config.sysfs_root.clone()));
    let initial = check_presence(usb.clone(), config.vendor_id).await;
    info!("USB: Initial check: camera {}", if initial { "present" } else { "absent" });

    let network = Arc::new(HostNetwork::new());
    let browser = Arc::new(MdnsBrowser::new().with_network(network.clone()));

    let bridge = GoProBridge::new(config.clone(), usb, browser, network);
    let state = Arc::new(AppState::new(bridge));
    let router = create_router(state);

    let addr = config.listen_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Channel server listening on {}", addr);
    info!("  Methods: POST http://{}/api/methods/<name>", addr);
    info!("  Events:  ws://{}/ws/events", addr);
    info!("Press Ctrl+C to stop.");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Shutting down...");
    };

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Goodbye!");
    Ok(())
}
