//! # Readiness Events
//!
//! Hands the Grafana controller's view of the world to sibling controllers.
//! The bus coalesces to the latest value: a publish never blocks and never
//! fails, and a slow subscriber simply observes the most recent state when it
//! next looks.

use crate::crds::Grafana;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::debug;

/// Timeout for Grafana API clients when the spec does not set one
pub const DEFAULT_CLIENT_TIMEOUT_SECONDS: i32 = 5;

/// Snapshot of controller state published once per reconcile
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerState {
    pub dashboard_selectors: Vec<LabelSelector>,
    pub dashboard_namespace_selector: Option<LabelSelector>,
    pub admin_url: String,
    pub grafana_ready: bool,
    pub client_timeout: i32,
}

impl ControllerState {
    pub fn not_ready() -> Self {
        Self::default()
    }

    pub fn ready(grafana: &Grafana, admin_url: String) -> Self {
        Self {
            dashboard_selectors: grafana.spec.dashboard_label_selector.clone(),
            dashboard_namespace_selector: grafana.spec.dashboard_namespace_selector.clone(),
            admin_url,
            grafana_ready: true,
            client_timeout: client_timeout(grafana),
        }
    }
}

/// Client timeout from the spec; absent or negative values use the default
pub fn client_timeout(grafana: &Grafana) -> i32 {
    match grafana.spec.client.as_ref().and_then(|c| c.timeout_seconds) {
        Some(seconds) if seconds >= 0 => seconds,
        _ => DEFAULT_CLIENT_TIMEOUT_SECONDS,
    }
}

/// Single logical channel of [`ControllerState`] values
#[derive(Debug)]
pub struct ReadinessBus {
    tx: watch::Sender<ControllerState>,
    published: AtomicU64,
}

impl ReadinessBus {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ControllerState::not_ready());
        Self {
            tx,
            published: AtomicU64::new(0),
        }
    }

    /// Replace the current state; works with zero subscribers
    pub fn publish(&self, state: ControllerState) {
        let seq = self.published.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            seq,
            ready = state.grafana_ready,
            admin_url = %state.admin_url,
            "publishing controller state"
        );
        self.tx.send_replace(state);
    }

    pub fn subscribe(&self) -> ReadinessWatcher {
        ReadinessWatcher {
            rx: self.tx.subscribe(),
        }
    }

    pub fn latest(&self) -> ControllerState {
        self.tx.borrow().clone()
    }

    /// Number of states published since the bus was created
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }
}

impl Default for ReadinessBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer side of the bus, for controllers that only act while Grafana is ready
#[derive(Debug, Clone)]
pub struct ReadinessWatcher {
    rx: watch::Receiver<ControllerState>,
}

impl ReadinessWatcher {
    pub fn current(&self) -> ControllerState {
        self.rx.borrow().clone()
    }

    /// Wait for the next published state
    ///
    /// Returns `None` once the bus has been dropped.
    pub async fn changed(&mut self) -> Option<ControllerState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Resolve as soon as the latest state reports Grafana as ready
    pub async fn wait_until_ready(&mut self) -> Option<ControllerState> {
        self.rx
            .wait_for(|state| state.grafana_ready)
            .await
            .ok()
            .map(|state| state.clone())
    }
}
