//! # Action Runner
//!
//! Executes planned actions against the cluster, strictly in order.

use crate::error::{Error, Result};
use crate::plan::ClusterAction;
use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::{debug, info};

pub const FIELD_MANAGER: &str = "grafana-operator";

#[async_trait]
pub trait ActionRunner: Send + Sync {
    async fn run(&self, action: &ClusterAction) -> Result<()>;

    /// Run every action in order; the first failure aborts the rest
    async fn run_all(&self, actions: &[ClusterAction]) -> Result<()> {
        for action in actions {
            self.run(action).await.map_err(|e| match e {
                Error::Cancelled => Error::Cancelled,
                other => Error::ActionFailed {
                    action: action.to_string(),
                    message: other.to_string(),
                },
            })?;
        }
        Ok(())
    }
}

/// Applies actions with server-side apply
pub struct KubeActionRunner {
    client: Client,
}

impl KubeActionRunner {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn apply<K>(&self, resource: &K) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + Serialize + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        let namespace = resource
            .namespace()
            .ok_or_else(|| Error::InvalidConfig(format!("{} has no namespace", resource.name_any())))?;
        let name = resource.name_any();
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);
        api.patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(resource),
        )
        .await?;
        debug!(namespace = %namespace, name = %name, "applied");
        Ok(())
    }
}

#[async_trait]
impl ActionRunner for KubeActionRunner {
    async fn run(&self, action: &ClusterAction) -> Result<()> {
        match action {
            ClusterAction::ApplyService(service) => self.apply(service.as_ref()).await,
            ClusterAction::ApplyDeployment(deployment) => self.apply(deployment.as_ref()).await,
            ClusterAction::ApplyIngress(ingress) => self.apply(ingress.as_ref()).await,
            ClusterAction::ApplyRoute(route) => self.apply(route.as_ref()).await,
            ClusterAction::DeleteIngress { namespace, name } => {
                let api: Api<k8s_openapi::api::networking::v1::Ingress> =
                    Api::namespaced(self.client.clone(), namespace);
                match api.delete(name, &DeleteParams::default()).await.map_err(Error::from) {
                    Ok(_) => {
                        info!(namespace = %namespace, name = %name, "deleted ingress");
                        Ok(())
                    }
                    Err(e) if e.is_not_found() => Ok(()),
                    Err(e) => Err(e),
                }
            }
        }
    }
}
