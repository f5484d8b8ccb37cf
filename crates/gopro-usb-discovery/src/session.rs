//! Time-bounded camera discovery sessions
//!
//! A session browses for the camera's service, runs each advertisement through
//! serial extraction and address derivation, and reports exactly one outcome:
//! the first derived address, a timeout, a browse failure, or cancellation.

use crate::mdns::{BrowseEvent, ServiceAdvertisement, ServiceBrowser, SERVICE_TYPE};
use gopro_usb_core::{derive_address, Config, DerivedAddress, RunLengthMatcher, SerialMatcher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Lifecycle of a discovery session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Browsing,
    Resolved,
    TimedOut,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::Idle | SessionState::Browsing)
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    Resolved(DerivedAddress),
    /// Carries the configured fallback address, if any
    TimedOut(Option<String>),
    Failed(String),
    Cancelled,
}

impl DiscoveryOutcome {
    fn state(&self) -> SessionState {
        match self {
            DiscoveryOutcome::Resolved(_) => SessionState::Resolved,
            DiscoveryOutcome::TimedOut(_) => SessionState::TimedOut,
            DiscoveryOutcome::Failed(_) => SessionState::Failed,
            DiscoveryOutcome::Cancelled => SessionState::Cancelled,
        }
    }

    /// The address reported to the caller
    pub fn address(&self) -> Option<String> {
        match self {
            DiscoveryOutcome::Resolved(address) => Some(address.to_string()),
            DiscoveryOutcome::TimedOut(fallback) => fallback.clone(),
            DiscoveryOutcome::Failed(_) | DiscoveryOutcome::Cancelled => None,
        }
    }
}

/// Parameters for one discovery session
#[derive(Clone)]
pub struct DiscoveryOptions {
    pub service_type: String,
    pub timeout: Duration,
    /// Case-insensitive substring required in the advertisement name
    pub product_marker: Option<String>,
    /// Delivered on timeout instead of no result
    pub timeout_fallback: Option<String>,
    /// Skip serials whose derived address is not valid IPv4
    pub strict_address: bool,
    pub matcher: Arc<dyn SerialMatcher>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            service_type: SERVICE_TYPE.to_string(),
            timeout: Duration::from_secs(10),
            product_marker: None,
            timeout_fallback: None,
            strict_address: false,
            matcher: Arc::new(RunLengthMatcher),
        }
    }
}

impl From<&Config> for DiscoveryOptions {
    fn from(config: &Config) -> Self {
        Self {
            service_type: config.service_type.clone(),
            timeout: config.discovery_timeout(),
            product_marker: config.product_marker.clone(),
            timeout_fallback: config.timeout_fallback.clone(),
            strict_address: config.strict_address,
            ..Self::default()
        }
    }
}

impl std::fmt::Debug for DiscoveryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryOptions")
            .field("service_type", &self.service_type)
            .field("timeout", &self.timeout)
            .field("product_marker", &self.product_marker)
            .field("timeout_fallback", &self.timeout_fallback)
            .field("strict_address", &self.strict_address)
            .finish()
    }
}

impl DiscoveryOptions {
    /// Derive an address from one advertisement, if it qualifies
    pub fn resolve(&self, ad: &ServiceAdvertisement) -> Option<DerivedAddress> {
        if let Some(marker) = &self.product_marker {
            if !ad.name.to_lowercase().contains(&marker.to_lowercase()) {
                debug!("Discovery: Ignoring '{}' (no '{}' marker)", ad.name, marker);
                return None;
            }
        }

        let serial = match self.matcher.extract(&ad.name) {
            Some(serial) => serial,
            None => {
                debug!("Discovery: No serial in '{}'", ad.name);
                return None;
            }
        };

        let address = derive_address(&serial);
        if self.strict_address && address.to_ipv4().is_none() {
            warn!(
                "Discovery: Serial {} gives invalid address {}, skipping",
                serial, address
            );
            return None;
        }

        debug!("Discovery: Serial {} -> {}", serial, address);
        Some(address)
    }
}

/// Delivers a value at most once, whichever completer gets there first
pub struct CompletionLatch<T> {
    fired: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> CompletionLatch<T> {
    pub fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let latch = Self {
            fired: AtomicBool::new(false),
            sender: Mutex::new(Some(tx)),
        };
        (latch, rx)
    }

    /// Deliver `value`; returns false if the latch already fired
    pub fn complete(&self, value: T) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(tx) = sender {
            // A dropped receiver means nobody is waiting any more
            let _ = tx.send(value);
        }
        true
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

struct Shared {
    state: RwLock<SessionState>,
    latch: CompletionLatch<DiscoveryOutcome>,
}

impl Shared {
    fn state(&self) -> SessionState {
        self.state.read().map(|g| *g).unwrap_or(SessionState::Failed)
    }

    fn set_state(&self, next: SessionState) {
        if let Ok(mut guard) = self.state.write() {
            if !guard.is_terminal() {
                *guard = next;
            }
        }
    }

    /// Move to the outcome's terminal state and deliver it, once
    fn finish(&self, outcome: DiscoveryOutcome) -> bool {
        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.is_terminal() {
            return false;
        }
        *state = outcome.state();
        self.latch.complete(outcome)
    }
}

/// A running discovery session
///
/// Dropping the session cancels it.
pub struct DiscoverySession {
    shared: Arc<Shared>,
    cancel_tx: Option<oneshot::Sender<()>>,
    outcome_rx: Option<oneshot::Receiver<DiscoveryOutcome>>,
    outcome: Option<DiscoveryOutcome>,
}

impl DiscoverySession {
    /// Start browsing on the current tokio runtime
    pub fn start(browser: Arc<dyn ServiceBrowser>, options: DiscoveryOptions) -> Self {
        let (latch, outcome_rx) = CompletionLatch::new();
        let shared = Arc::new(Shared {
            state: RwLock::new(SessionState::Idle),
            latch,
        });
        let (cancel_tx, cancel_rx) = oneshot::channel();

        tokio::spawn(drive(browser, options, shared.clone(), cancel_rx));

        Self {
            shared,
            cancel_tx: Some(cancel_tx),
            outcome_rx: Some(outcome_rx),
            outcome: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Cancel the session; safe to call repeatedly or after it finished
    pub fn cancel(&mut self) {
        if self.shared.finish(DiscoveryOutcome::Cancelled) {
            info!("Discovery: Session cancelled");
        }
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Wait for the session's outcome
    pub async fn outcome(&mut self) -> DiscoveryOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let outcome = match self.outcome_rx.take() {
            Some(rx) => rx.await.unwrap_or(DiscoveryOutcome::Cancelled),
            None => DiscoveryOutcome::Cancelled,
        };
        self.outcome = Some(outcome.clone());
        outcome
    }
}

impl Drop for DiscoverySession {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Run one session and return the address it reports
pub async fn discover(browser: Arc<dyn ServiceBrowser>, options: DiscoveryOptions) -> Option<String> {
    DiscoverySession::start(browser, options).outcome().await.address()
}

async fn drive(
    browser: Arc<dyn ServiceBrowser>,
    options: DiscoveryOptions,
    shared: Arc<Shared>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    shared.set_state(SessionState::Browsing);

    let mut stream = match browser.browse(&options.service_type) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Discovery: Failed to start browsing: {}", e);
            shared.finish(DiscoveryOutcome::Failed(e.to_string()));
            return;
        }
    };

    let deadline = tokio::time::sleep(options.timeout);
    tokio::pin!(deadline);

    let outcome = loop {
        tokio::select! {
            biased;
            _ = &mut cancel_rx => break DiscoveryOutcome::Cancelled,
            event = stream.next() => match event {
                Some(BrowseEvent::Found(ad)) => {
                    debug!("Discovery: Advertisement '{}'", ad.name);
                    if let Some(address) = options.resolve(&ad) {
                        break DiscoveryOutcome::Resolved(address);
                    }
                }
                Some(BrowseEvent::Failed(reason)) => {
                    warn!("Discovery: Browse failed: {}", reason);
                    break DiscoveryOutcome::Failed(reason);
                }
                None => break DiscoveryOutcome::Failed("browse stream closed".to_string()),
            },
            _ = &mut deadline => {
                info!("Discovery: Timed out after {:?}", options.timeout);
                break DiscoveryOutcome::TimedOut(options.timeout_fallback.clone());
            }
        }
    };

    stream.stop();

    match &outcome {
        DiscoveryOutcome::Resolved(address) => info!("Discovery: Camera at {}", address),
        DiscoveryOutcome::TimedOut(Some(fallback)) => info!("Discovery: Using fallback {}", fallback),
        _ => {}
    }

    if !shared.finish(outcome) {
        debug!("Discovery: Session already completed, dropping late outcome");
    }
}
