//! # Grafana Reconciler
//!
//! One reconcile cycle for a Grafana instance: read the cluster state, plan
//! and apply the actions that move it toward the spec, record the outcome in
//! the status sub-resource and tell sibling controllers whether Grafana is
//! usable.
//!
//! Every cycle that gets past the initial fetch publishes exactly one
//! [`ControllerState`]. Failures after that point never stop reconciliation:
//! the instance is marked as failing and requeued after a fixed delay.

use crate::admin_url::resolve_admin_url;
use crate::config::{
    ControllerConfig, CONFIG_DASHBOARD_LABEL_SELECTOR, CONFIG_GRAFANA_DASHBOARDS_SYNCED,
    REQUEUE_DELAY,
};
use crate::crds::{Grafana, ObjectKey, StatusPhase};
use crate::discovery::{JsonnetLibraryDiscovery, LibraryDiscovery};
use crate::error::{Error, Result};
use crate::events::{ControllerState, ReadinessBus};
use crate::plan::{GrafanaPlanner, Planner};
use crate::recorder::{reasons, EventRecorder, KubeEventRecorder};
use crate::runner::{ActionRunner, KubeActionRunner};
use crate::state::{ClusterState, KubeStateReader, StateReader};
use crate::status::StatusSyncer;
use crate::store::{GrafanaStore, KubeGrafanaStore};
use crate::OperatorConfig;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::Client;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The external pieces a reconcile cycle talks to
pub struct Collaborators {
    pub store: Arc<dyn GrafanaStore>,
    pub state_reader: Arc<dyn StateReader>,
    pub planner: Arc<dyn Planner>,
    pub runner: Arc<dyn ActionRunner>,
    pub discovery: Arc<dyn LibraryDiscovery>,
    pub recorder: Arc<dyn EventRecorder>,
}

impl Collaborators {
    /// Kubernetes-backed collaborators sharing one client
    pub fn kube(client: Client, config: Arc<ControllerConfig>, operator: &OperatorConfig) -> Self {
        Self {
            store: Arc::new(KubeGrafanaStore::new(client.clone())),
            state_reader: Arc::new(KubeStateReader::new(client.clone(), operator.openshift)),
            planner: Arc::new(GrafanaPlanner::new(operator.openshift)),
            runner: Arc::new(KubeActionRunner::new(client.clone())),
            discovery: Arc::new(JsonnetLibraryDiscovery::new(client.clone(), config)),
            recorder: Arc::new(KubeEventRecorder::new(client, &operator.controller_name)),
        }
    }
}

/// Reconciler for Grafana resources
pub struct GrafanaReconciler {
    store: Arc<dyn GrafanaStore>,
    state_reader: Arc<dyn StateReader>,
    planner: Arc<dyn Planner>,
    runner: Arc<dyn ActionRunner>,
    discovery: Arc<dyn LibraryDiscovery>,
    recorder: Arc<dyn EventRecorder>,
    status: StatusSyncer,
    config: Arc<ControllerConfig>,
    readiness: Arc<ReadinessBus>,
    requeue_delay: Duration,
}

impl GrafanaReconciler {
    pub fn new(
        parts: Collaborators,
        config: Arc<ControllerConfig>,
        readiness: Arc<ReadinessBus>,
    ) -> Self {
        Self {
            status: StatusSyncer::new(Arc::clone(&parts.store)),
            store: parts.store,
            state_reader: parts.state_reader,
            planner: parts.planner,
            runner: parts.runner,
            discovery: parts.discovery,
            recorder: parts.recorder,
            config,
            readiness,
            requeue_delay: REQUEUE_DELAY,
        }
    }

    pub fn with_requeue_delay(mut self, delay: Duration) -> Self {
        self.requeue_delay = delay;
        self
    }

    pub fn readiness(&self) -> &Arc<ReadinessBus> {
        &self.readiness
    }

    /// Main reconciliation logic
    ///
    /// `Err` is only returned when the object could not be read (or its
    /// status could not be recorded on the error path); the caller should
    /// back off and retry.
    pub async fn reconcile(&self, key: &ObjectKey, cancel: &CancellationToken) -> Result<Action> {
        let instance = match guarded(cancel, self.store.get(key)).await {
            Ok(instance) => instance,
            Err(e) if e.is_not_found() => return Ok(self.handle_deleted(key)),
            Err(e) => {
                error!(grafana = %key, error = %e, "failed to fetch Grafana");
                return Err(e);
            }
        };

        info!(grafana = %key, "Reconciling Grafana");

        let cr = instance.clone();
        match self.converge(&cr, cancel).await {
            Ok(state) => self.manage_success(cr, &state, cancel).await,
            Err(e) => self.manage_error(cr, e, cancel).await,
        }
    }

    /// Grafana is gone: stop dependants from acting on stale configuration
    fn handle_deleted(&self, key: &ObjectKey) -> Action {
        info!(grafana = %key, "Grafana not found, cleaning up controller config");
        self.config.remove_config_item(CONFIG_DASHBOARD_LABEL_SELECTOR);
        self.config.cleanup(true);
        self.readiness.publish(ControllerState::not_ready());
        Action::await_change()
    }

    async fn converge(&self, cr: &Grafana, cancel: &CancellationToken) -> Result<ClusterState> {
        let state = guarded(cancel, self.state_reader.read(cr))
            .await
            .map_err(|e| {
                error!(error = %e, "error reading state");
                e
            })?;

        let actions = self.planner.plan(&state, cr);
        debug!(actions = actions.len(), "running actions");
        guarded(cancel, self.runner.run_all(&actions)).await?;

        guarded(cancel, self.discovery.discover(cr)).await?;

        Ok(state)
    }

    async fn manage_error(
        &self,
        mut cr: Grafana,
        issue: Error,
        cancel: &CancellationToken,
    ) -> Result<Action> {
        let message = issue.to_string();
        warn!(grafana = ?cr.key().ok(), error = %message, "reconcile failed");

        let recorded = guarded(cancel, async {
            self.recorder
                .record(&cr, EventType::Warning, reasons::PROCESSING_ERROR, message.clone())
                .await;
            Ok(())
        })
        .await;
        if recorded.is_err() {
            debug!("cancelled before the warning event was recorded");
        }

        let status = cr.status.get_or_insert_with(Default::default);
        status.phase = StatusPhase::Failing;
        status.message = message;

        let synced = guarded(cancel, self.status.sync_status(&cr)).await;

        self.config.invalidate_dashboards();
        self.readiness.publish(ControllerState::not_ready());

        match synced {
            Ok(outcome) => {
                debug!(?outcome, "failing status synced");
                Ok(Action::requeue(self.requeue_delay))
            }
            Err(e) => {
                error!(error = %e, "failed to record failing status");
                Err(e)
            }
        }
    }

    async fn manage_success(
        &self,
        mut cr: Grafana,
        state: &ClusterState,
        cancel: &CancellationToken,
    ) -> Result<Action> {
        let status = cr.status.get_or_insert_with(Default::default);
        status.phase = StatusPhase::Reconciling;
        status.message = "success".to_string();

        // Only take the dashboard list once the dashboard controller has
        // synced; until then keep whatever the CR already reports.
        if self.config.get_config_bool(CONFIG_GRAFANA_DASHBOARDS_SYNCED, false) {
            status.installed_dashboards = self.config.dashboards();
        } else if self.config.dashboards().is_none() {
            self.config.set_dashboards(Vec::new());
        }

        match guarded(cancel, self.status.sync_status(&cr)).await {
            Ok(outcome) => debug!(?outcome, "status synced"),
            Err(e) => return self.manage_error(cr, e, cancel).await,
        }

        let admin_url = match resolve_admin_url(&cr, state) {
            Ok(url) => url,
            Err(e) => return self.manage_error(cr, e, cancel).await,
        };

        self.readiness.publish(ControllerState::ready(&cr, admin_url));

        debug!("desired cluster state met");
        Ok(Action::requeue(self.requeue_delay))
    }
}

/// Race a blocking call against cancellation of the reconcile
async fn guarded<T>(cancel: &CancellationToken, call: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = call => result,
    }
}
