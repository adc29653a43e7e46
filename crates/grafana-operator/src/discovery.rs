//! Jsonnet library discovery.
//!
//! Dashboards may be written in jsonnet and import shared libraries that live
//! in ConfigMaps. Each reconcile records which library ConfigMaps are visible
//! to the instance so the dashboard controller can mount them.

use crate::config::{ControllerConfig, CONFIG_JSONNET_LIBRARIES};
use crate::crds::Grafana;
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::{Api, ListParams, ResourceExt};
use kube::Client;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait LibraryDiscovery: Send + Sync {
    async fn discover(&self, grafana: &Grafana) -> Result<()>;
}

pub struct JsonnetLibraryDiscovery {
    client: Client,
    config: Arc<ControllerConfig>,
}

impl JsonnetLibraryDiscovery {
    pub fn new(client: Client, config: Arc<ControllerConfig>) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl LibraryDiscovery for JsonnetLibraryDiscovery {
    async fn discover(&self, grafana: &Grafana) -> Result<()> {
        let Some(selector) = grafana
            .spec
            .jsonnet
            .as_ref()
            .and_then(|j| j.library_label_selector.as_ref())
        else {
            self.config.remove_config_item(CONFIG_JSONNET_LIBRARIES);
            return Ok(());
        };

        let key = grafana.key()?;
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &key.namespace);
        let list = api
            .list(&ListParams::default().labels(&selector_to_string(selector)?))
            .await?;

        let mut names: Vec<String> = list.items.iter().map(|cm| cm.name_any()).collect();
        names.sort();
        debug!(grafana = %key, libraries = ?names, "discovered jsonnet libraries");

        self.config
            .set_config_item(CONFIG_JSONNET_LIBRARIES, serde_json::to_value(names)?);
        Ok(())
    }
}

/// Render a label selector in the `ListParams::labels` syntax
pub fn selector_to_string(selector: &LabelSelector) -> Result<String> {
    let mut parts: Vec<String> = selector
        .match_labels
        .iter()
        .flatten()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();

    for expr in selector.match_expressions.iter().flatten() {
        let values = expr.values.clone().unwrap_or_default().join(",");
        let part = match expr.operator.as_str() {
            "In" => format!("{} in ({})", expr.key, values),
            "NotIn" => format!("{} notin ({})", expr.key, values),
            "Exists" => expr.key.clone(),
            "DoesNotExist" => format!("!{}", expr.key),
            other => {
                return Err(Error::InvalidConfig(format!(
                    "unsupported label selector operator {:?} on key {}",
                    other, expr.key
                )))
            }
        };
        parts.push(part);
    }

    Ok(parts.join(","))
}
