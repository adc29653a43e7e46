//! # Plan Generation
//!
//! Turns a [`ClusterState`] and the desired Grafana spec into an ordered list
//! of actions. Order matters: the runner applies them front to back and stops
//! at the first failure, so every action must be safe to repeat.

use crate::crds::{Grafana, Route};
use crate::resources::{self, GRAFANA_INGRESS_NAME};
use crate::state::ClusterState;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use std::fmt;

/// One idempotent mutation of a child resource
#[derive(Debug, Clone)]
pub enum ClusterAction {
    ApplyService(Box<Service>),
    ApplyDeployment(Box<Deployment>),
    ApplyIngress(Box<Ingress>),
    ApplyRoute(Box<Route>),
    DeleteIngress { namespace: String, name: String },
}

impl fmt::Display for ClusterAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (verb, kind, namespace, name) = match self {
            ClusterAction::ApplyService(s) => ("apply", "Service", s.namespace(), s.name_any()),
            ClusterAction::ApplyDeployment(d) => {
                ("apply", "Deployment", d.namespace(), d.name_any())
            }
            ClusterAction::ApplyIngress(i) => ("apply", "Ingress", i.namespace(), i.name_any()),
            ClusterAction::ApplyRoute(r) => ("apply", "Route", r.namespace(), r.name_any()),
            ClusterAction::DeleteIngress { namespace, name } => {
                ("delete", "Ingress", Some(namespace.clone()), name.clone())
            }
        };
        write!(
            f,
            "{} {} {}/{}",
            verb,
            kind,
            namespace.unwrap_or_default(),
            name
        )
    }
}

pub trait Planner: Send + Sync {
    fn plan(&self, state: &ClusterState, grafana: &Grafana) -> Vec<ClusterAction>;
}

/// Desired layout: service first so the ingress backend exists, then the
/// deployment, then the ingress (or its removal), then the route on OpenShift.
#[derive(Debug, Default, Clone)]
pub struct GrafanaPlanner {
    /// Manage a `grafana-route`; the Route API only exists on OpenShift
    pub routes: bool,
}

impl GrafanaPlanner {
    pub fn new(routes: bool) -> Self {
        Self { routes }
    }
}

impl Planner for GrafanaPlanner {
    fn plan(&self, state: &ClusterState, grafana: &Grafana) -> Vec<ClusterAction> {
        let mut actions = vec![
            ClusterAction::ApplyService(Box::new(resources::build_service(grafana))),
            ClusterAction::ApplyDeployment(Box::new(resources::build_deployment(grafana))),
        ];

        match resources::build_ingress(grafana) {
            Some(ingress) => actions.push(ClusterAction::ApplyIngress(Box::new(ingress))),
            None => {
                if let Some(existing) = &state.grafana_ingress {
                    actions.push(ClusterAction::DeleteIngress {
                        namespace: existing
                            .namespace()
                            .or_else(|| grafana.namespace())
                            .unwrap_or_default(),
                        name: GRAFANA_INGRESS_NAME.to_string(),
                    });
                }
            }
        }

        if self.routes {
            actions.push(ClusterAction::ApplyRoute(Box::new(resources::build_route(grafana))));
        }

        actions
    }
}
