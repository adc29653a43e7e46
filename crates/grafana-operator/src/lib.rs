//! # Grafana Kubernetes Operator
//!
//! Reconciles `Grafana` custom resources: converges the child resources of
//! each instance, records the outcome in its status and publishes readiness
//! to sibling controllers through a [`ReadinessBus`].

pub mod admin_url;
pub mod config;
pub mod controller;
pub mod crds;
pub mod discovery;
pub mod error;
pub mod events;
pub mod manager;
pub mod plan;
pub mod reconciler;
pub mod recorder;
pub mod resources;
pub mod runner;
pub mod state;
pub mod status;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use admin_url::resolve_admin_url;
pub use config::ControllerConfig;
pub use controller::GrafanaController;
pub use crds::*;
pub use error::{Error, Result};
pub use events::{ControllerState, ReadinessBus, ReadinessWatcher};
pub use manager::{OperatorBuilder, OperatorManager};
pub use reconciler::{Collaborators, GrafanaReconciler};
pub use status::StatusSyncer;

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Operator configuration
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Namespace to watch; `None` watches the whole cluster
    pub watch_namespace: Option<String>,
    /// Namespace the operator itself runs in
    pub operator_namespace: String,
    /// Requeue delay after every reconcile
    pub requeue_delay: Duration,
    /// Backoff after a reconcile returned an error
    pub error_backoff: Duration,
    pub health_addr: SocketAddr,
    /// Name reported on Kubernetes events
    pub controller_name: String,
    /// Create the Grafana CRD at startup if missing
    pub install_crd: bool,
    /// Look for OpenShift routes
    pub openshift: bool,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            operator_namespace: "default".to_string(),
            requeue_delay: config::REQUEUE_DELAY,
            error_backoff: Duration::from_secs(30),
            health_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            controller_name: "grafana-controller".to_string(),
            install_crd: false,
            openshift: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_config_default() {
        let config = OperatorConfig::default();
        assert_eq!(config.operator_namespace, "default");
        assert_eq!(config.requeue_delay, Duration::from_secs(10));
        assert_eq!(config.health_addr.port(), 8080);
        assert!(config.watch_namespace.is_none());
        assert!(!config.openshift);
    }
}
