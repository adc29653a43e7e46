//! # Kubernetes Controller
//!
//! Wires [`GrafanaReconciler`] into `kube::runtime::Controller`, which
//! delivers triggers and serializes reconciles per object.
//!
//! The runtime never hands a deleted object to `reconcile`: once a Grafana
//! leaves the reflector cache its pending trigger comes back out of the run
//! stream as `ObjectNotFound`. Those are fed to the reconciler by key so the
//! deletion cleanup still runs.

use crate::crds::{Grafana, ObjectKey};
use crate::error::{Error, Result};
use crate::reconciler::GrafanaReconciler;
use futures::StreamExt;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, PostParams, ResourceExt};
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::watcher;
use kube::{Client, CustomResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type RunError = controller::Error<Error, watcher::Error>;

/// Shared state handed to every reconcile
struct ControllerContext {
    reconciler: Arc<GrafanaReconciler>,
    error_backoff: Duration,
    shutdown: CancellationToken,
}

/// Controller for Grafana resources
pub struct GrafanaController {
    client: Client,
    reconciler: Arc<GrafanaReconciler>,
    /// Restrict the watch to one namespace; `None` watches all
    namespace: Option<String>,
    error_backoff: Duration,
    shutdown: CancellationToken,
}

impl GrafanaController {
    pub fn new(client: Client, reconciler: Arc<GrafanaReconciler>, shutdown: CancellationToken) -> Self {
        Self {
            client,
            reconciler,
            namespace: None,
            error_backoff: Duration::from_secs(30),
            shutdown,
        }
    }

    pub fn namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Run until the shutdown token is cancelled
    pub async fn run(self) -> Result<()> {
        info!(namespace = ?self.namespace, "Starting Grafana controller");

        let api: Api<Grafana> = match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };

        let ctx = Arc::new(ControllerContext {
            reconciler: self.reconciler,
            error_backoff: self.error_backoff,
            shutdown: self.shutdown.clone(),
        });

        let shutdown = self.shutdown.clone();
        let stream_ctx = Arc::clone(&ctx);
        Controller::new(api, watcher::Config::default())
            .graceful_shutdown_on(async move { shutdown.cancelled().await })
            .run(reconcile, error_policy, ctx)
            .for_each(|result| {
                let ctx = Arc::clone(&stream_ctx);
                async move {
                    match result {
                        Ok((obj, action)) => debug!(grafana = %obj, ?action, "reconciled"),
                        Err(e) => handle_run_error(e, &ctx).await,
                    }
                }
            })
            .await;

        info!("Grafana controller stopped");
        Ok(())
    }
}

async fn reconcile(grafana: Arc<Grafana>, ctx: Arc<ControllerContext>) -> Result<Action> {
    let namespace = grafana
        .namespace()
        .ok_or_else(|| Error::InvalidConfig(format!("Grafana {} has no namespace", grafana.name_any())))?;
    let key = ObjectKey::new(namespace, grafana.name_any());
    ctx.reconciler.reconcile(&key, &ctx.shutdown).await
}

fn error_policy(grafana: Arc<Grafana>, error: &Error, ctx: Arc<ControllerContext>) -> Action {
    warn!(grafana = %grafana.name_any(), error = %error, "reconcile error, backing off");
    Action::requeue(ctx.error_backoff)
}

/// Key of a Grafana that disappeared from the cache while a trigger was pending
fn deleted_key(error: &RunError) -> Option<ObjectKey> {
    match error {
        controller::Error::ObjectNotFound(obj) => obj
            .namespace
            .as_ref()
            .map(|ns| ObjectKey::new(ns.clone(), obj.name.clone())),
        _ => None,
    }
}

async fn handle_run_error(error: RunError, ctx: &ControllerContext) {
    let Some(key) = deleted_key(&error) else {
        warn!(error = %error, "reconcile failed");
        return;
    };

    info!(grafana = %key, "Grafana gone from cache, running deletion cleanup");
    if let Err(e) = ctx.reconciler.reconcile(&key, &ctx.shutdown).await {
        warn!(grafana = %key, error = %e, "deletion cleanup failed");
    }
}

/// Install the Grafana CRD if it doesn't exist
pub async fn install_crd(client: Client) -> Result<()> {
    let crd = Grafana::crd();
    let name = crd.name_any();
    let crds: Api<CustomResourceDefinition> = Api::all(client);

    match crds.get(&name).await.map_err(Error::from) {
        Ok(_) => {
            info!(crd = %name, "CRD already exists");
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            info!(crd = %name, "Installing CRD");
            crds.create(&PostParams::default(), &crd).await?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ControllerConfig, CONFIG_DASHBOARD_LABEL_SELECTOR};
    use crate::events::{ControllerState, ReadinessBus};
    use crate::reconciler::Collaborators;
    use crate::testing::{
        grafana, FakeDiscovery, FakeRunner, FakeStateReader, FakeStore, FixedPlanner,
        RecordingRecorder,
    };
    use kube::runtime::reflector::ObjectRef;

    struct Fixture {
        config: Arc<ControllerConfig>,
        readiness: Arc<ReadinessBus>,
        ctx: ControllerContext,
    }

    /// Context whose store no longer holds any Grafana
    fn fixture() -> Fixture {
        let config = Arc::new(ControllerConfig::new());
        let readiness = Arc::new(ReadinessBus::new());
        let parts = Collaborators {
            store: Arc::new(FakeStore::empty()),
            state_reader: Arc::new(FakeStateReader::default()),
            planner: Arc::new(FixedPlanner),
            runner: Arc::new(FakeRunner::default()),
            discovery: Arc::new(FakeDiscovery::default()),
            recorder: Arc::new(RecordingRecorder::default()),
        };
        let reconciler = GrafanaReconciler::new(parts, Arc::clone(&config), Arc::clone(&readiness));

        config.set_config_item(CONFIG_DASHBOARD_LABEL_SELECTOR, "app=grafana");
        readiness.publish(ControllerState::ready(
            &grafana("ns", "g"),
            "http://grafana-service.ns.svc.cluster.local:3000".to_string(),
        ));

        Fixture {
            config,
            readiness,
            ctx: ControllerContext {
                reconciler: Arc::new(reconciler),
                error_backoff: Duration::from_secs(30),
                shutdown: CancellationToken::new(),
            },
        }
    }

    fn object_not_found(namespace: &str, name: &str) -> RunError {
        controller::Error::ObjectNotFound(ObjectRef::<Grafana>::new(name).within(namespace).erase())
    }

    #[test]
    fn test_deleted_key_from_object_not_found() {
        assert_eq!(
            deleted_key(&object_not_found("ns", "g")),
            Some(ObjectKey::new("ns", "g"))
        );

        let without_namespace =
            controller::Error::ObjectNotFound(ObjectRef::<Grafana>::new("g").erase());
        assert_eq!(deleted_key(&without_namespace), None);
    }

    #[tokio::test]
    async fn test_deleted_grafana_runs_cleanup() {
        let f = fixture();
        assert!(f.readiness.latest().grafana_ready);

        handle_run_error(object_not_found("ns", "g"), &f.ctx).await;

        assert!(!f.config.has_config_item(CONFIG_DASHBOARD_LABEL_SELECTOR));
        assert_eq!(f.config.dashboards(), Some(Vec::new()));
        assert_eq!(f.readiness.published_count(), 2);
        assert!(!f.readiness.latest().grafana_ready);
    }

    #[tokio::test]
    async fn test_reconciler_failure_is_only_logged() {
        let f = fixture();
        let error = controller::Error::ReconcilerFailed(
            Error::NoAdminUrl,
            ObjectRef::<Grafana>::new("g").within("ns").erase(),
        );

        handle_run_error(error, &f.ctx).await;

        assert!(f.config.has_config_item(CONFIG_DASHBOARD_LABEL_SELECTOR));
        assert_eq!(f.readiness.published_count(), 1);
        assert!(f.readiness.latest().grafana_ready);
    }
}
