//! Object store access for Grafana resources.

use crate::crds::{Grafana, ObjectKey};
use crate::error::Result;
use async_trait::async_trait;
use kube::api::{Api, PostParams, ResourceExt};
use kube::Client;
use tracing::debug;

/// Read and status-write access to Grafana objects
///
/// A missing object must surface as [`crate::Error::NotFound`] and an
/// optimistic concurrency failure on write as [`crate::Error::Conflict`].
#[async_trait]
pub trait GrafanaStore: Send + Sync {
    async fn get(&self, key: &ObjectKey) -> Result<Grafana>;

    /// Write the status sub-resource of `grafana`, guarded by its resourceVersion
    async fn update_status(&self, grafana: &Grafana) -> Result<()>;
}

pub struct KubeGrafanaStore {
    client: Client,
}

impl KubeGrafanaStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Grafana> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl GrafanaStore for KubeGrafanaStore {
    async fn get(&self, key: &ObjectKey) -> Result<Grafana> {
        Ok(self.api(&key.namespace).get(&key.name).await?)
    }

    async fn update_status(&self, grafana: &Grafana) -> Result<()> {
        let key = grafana.key()?;
        self.api(&key.namespace)
            .replace_status(
                &grafana.name_any(),
                &PostParams::default(),
                serde_json::to_vec(grafana)?,
            )
            .await?;
        debug!(grafana = %key, "status written");
        Ok(())
    }
}
