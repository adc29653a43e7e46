//! # Cluster State
//!
//! Snapshot of the child resources currently observed for one Grafana
//! instance. Rebuilt every reconcile, never persisted.

use crate::crds::{Grafana, Route};
use crate::error::Result;
use crate::resources::{
    GRAFANA_DEPLOYMENT_NAME, GRAFANA_INGRESS_NAME, GRAFANA_ROUTE_NAME, GRAFANA_SERVICE_NAME,
};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::Api;
use kube::Client;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

#[derive(Debug, Clone, Default)]
pub struct ClusterState {
    pub grafana_service: Option<Service>,
    pub grafana_ingress: Option<Ingress>,
    pub grafana_route: Option<Route>,
    pub grafana_deployment: Option<Deployment>,
}

impl ClusterState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Builds a [`ClusterState`] for one Grafana instance
#[async_trait]
pub trait StateReader: Send + Sync {
    async fn read(&self, grafana: &Grafana) -> Result<ClusterState>;
}

/// Reads child resources by their well-known names
pub struct KubeStateReader {
    client: Client,
    /// Routes only exist on OpenShift
    routes_enabled: bool,
}

impl KubeStateReader {
    pub fn new(client: Client, routes_enabled: bool) -> Self {
        Self {
            client,
            routes_enabled,
        }
    }

    async fn get_opt<K>(&self, namespace: &str, name: &str) -> Result<Option<K>>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}

#[async_trait]
impl StateReader for KubeStateReader {
    async fn read(&self, grafana: &Grafana) -> Result<ClusterState> {
        let key = grafana.key()?;
        let ns = key.namespace.as_str();

        let grafana_route = if self.routes_enabled {
            self.get_opt::<Route>(ns, GRAFANA_ROUTE_NAME).await?
        } else {
            None
        };

        let state = ClusterState {
            grafana_service: self.get_opt::<Service>(ns, GRAFANA_SERVICE_NAME).await?,
            grafana_ingress: self.get_opt::<Ingress>(ns, GRAFANA_INGRESS_NAME).await?,
            grafana_route,
            grafana_deployment: self
                .get_opt::<Deployment>(ns, GRAFANA_DEPLOYMENT_NAME)
                .await?,
        };

        tracing::debug!(
            grafana = %key,
            service = state.grafana_service.is_some(),
            ingress = state.grafana_ingress.is_some(),
            route = state.grafana_route.is_some(),
            deployment = state.grafana_deployment.is_some(),
            "read cluster state"
        );

        Ok(state)
    }
}
