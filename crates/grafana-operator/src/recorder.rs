//! Kubernetes Event recording.
//!
//! Events are fire-and-forget: a failed publish is logged and never breaks
//! reconciliation.

use crate::crds::Grafana;
use async_trait::async_trait;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};
use tracing::warn;

/// Event reason strings shown in `kubectl get events`.
pub mod reasons {
    /// A reconcile cycle failed and the instance was marked as failing
    pub const PROCESSING_ERROR: &str = "ProcessingError";
}

pub const ACTION_RECONCILE: &str = "Reconcile";

#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record(&self, grafana: &Grafana, type_: EventType, reason: &str, note: String);
}

/// Publishes events through `kube::runtime::events::Recorder`
pub struct KubeEventRecorder {
    client: Client,
    reporter: Reporter,
}

impl KubeEventRecorder {
    pub fn new(client: Client, controller_name: &str) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: controller_name.to_string(),
                instance: std::env::var("POD_NAME").ok(),
            },
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn record(&self, grafana: &Grafana, type_: EventType, reason: &str, note: String) {
        let recorder = Recorder::new(
            self.client.clone(),
            self.reporter.clone(),
            grafana.object_ref(&()),
        );
        let event = Event {
            type_,
            reason: reason.to_string(),
            note: Some(note),
            action: ACTION_RECONCILE.to_string(),
            secondary: None,
        };
        if let Err(e) = recorder.publish(event).await {
            warn!(reason, error = %e, "failed to publish Kubernetes event");
        }
    }
}
