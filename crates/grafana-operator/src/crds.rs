//! # Custom Resource Definitions
//!
//! The `Grafana` resource reconciled by this operator, plus the OpenShift
//! `Route` type the operator reads but does not own the definition of.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

/// Port Grafana listens on when the spec does not override it
pub const DEFAULT_GRAFANA_PORT: u16 = 3000;

/// Grafana CRD - one deployed Grafana instance
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "integreatly.org",
    version = "v1alpha1",
    kind = "Grafana",
    plural = "grafanas",
    derive = "Default",
    namespaced
)]
#[kube(status = "GrafanaStatus")]
#[serde(rename_all = "camelCase")]
pub struct GrafanaSpec {
    /// grafana.ini related settings
    #[serde(default)]
    pub config: GrafanaConfig,

    /// Ingress exposure
    pub ingress: Option<GrafanaIngress>,

    /// Service exposure
    pub service: Option<GrafanaServiceSpec>,

    /// Deployment overrides
    pub deployment: Option<GrafanaDeploymentSpec>,

    /// Settings for the operator's own API client
    pub client: Option<GrafanaClient>,

    /// Selectors for dashboards this instance should pick up
    #[serde(default)]
    pub dashboard_label_selector: Vec<LabelSelector>,

    /// Restricts dashboard discovery to matching namespaces
    pub dashboard_namespace_selector: Option<LabelSelector>,

    /// Jsonnet library discovery
    pub jsonnet: Option<JsonnetConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaConfig {
    #[serde(default)]
    pub server: GrafanaServerConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaServerConfig {
    /// HTTP port Grafana binds to
    pub http_port: Option<u16>,
}

/// Ingress configuration
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaIngress {
    /// Create an ingress for this instance
    #[serde(default)]
    pub enabled: bool,

    /// Externally visible hostname, also used as the admin URL host
    #[serde(default)]
    pub hostname: String,

    /// Path prefix
    pub path: Option<String>,

    /// Ingress class name
    pub ingress_class_name: Option<String>,

    /// Terminate TLS at the ingress
    #[serde(default)]
    pub tls_enabled: bool,

    /// Secret holding the TLS certificate
    pub tls_secret_name: Option<String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Service configuration
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaServiceSpec {
    /// Service type (ClusterIP, NodePort, LoadBalancer)
    #[serde(rename = "type")]
    pub type_: Option<String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Deployment configuration
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaDeploymentSpec {
    pub replicas: Option<i32>,

    /// Full image reference, e.g. grafana/grafana:9.5.2
    pub image: Option<String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// Client settings used by controllers talking to the Grafana API
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaClient {
    /// Request timeout in seconds; negative values fall back to the default
    pub timeout_seconds: Option<i32>,

    /// Reach Grafana through its in-cluster service instead of a route or ingress
    pub prefer_service: Option<bool>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JsonnetConfig {
    /// Selects ConfigMaps that carry jsonnet libraries
    pub library_label_selector: Option<LabelSelector>,
}

/// Grafana status
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaStatus {
    #[serde(default)]
    pub phase: StatusPhase,

    #[serde(default)]
    pub message: String,

    /// Dashboards currently installed into this instance
    pub installed_dashboards: Option<Vec<GrafanaDashboardRef>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum StatusPhase {
    #[default]
    #[serde(rename = "")]
    Unknown,

    #[serde(rename = "reconciling")]
    Reconciling,

    #[serde(rename = "failing")]
    Failing,
}

/// Reference to a dashboard installed into a Grafana instance
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaDashboardRef {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub uid: String,
    /// Content hash; empty means the dashboard must be re-pushed
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub folder_name: String,
    pub folder_id: Option<i64>,
}

/// Plugin required by a dashboard
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct GrafanaPlugin {
    pub name: String,
    pub version: String,
}

/// OpenShift Route exposing the Grafana service outside the cluster
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "route.openshift.io",
    version = "v1",
    kind = "Route",
    plural = "routes",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    /// Left empty so the router assigns one
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,

    pub path: Option<String>,

    pub to: RouteTargetReference,

    pub port: Option<RoutePort>,

    pub tls: Option<RouteTls>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteTargetReference {
    pub kind: String,
    pub name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoutePort {
    pub target_port: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteTls {
    pub termination: String,
}

/// Namespaced identity of a Grafana object
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl Grafana {
    /// Identity of this object; Grafana is namespaced so a missing namespace is invalid
    pub fn key(&self) -> Result<ObjectKey> {
        let namespace = self.namespace().ok_or_else(|| {
            Error::InvalidConfig(format!("Grafana {} has no namespace", self.name_any()))
        })?;
        Ok(ObjectKey::new(namespace, self.name_any()))
    }

    pub fn prefer_service(&self) -> bool {
        self.spec
            .client
            .as_ref()
            .and_then(|c| c.prefer_service)
            .unwrap_or(false)
    }

    pub fn grafana_port(&self) -> u16 {
        self.spec
            .config
            .server
            .http_port
            .unwrap_or(DEFAULT_GRAFANA_PORT)
    }

    pub fn ingress_enabled(&self) -> bool {
        self.spec.ingress.as_ref().map(|i| i.enabled).unwrap_or(false)
    }

    /// Hostname override from the ingress spec, if set and non-empty
    pub fn ingress_hostname(&self) -> Option<&str> {
        self.spec
            .ingress
            .as_ref()
            .map(|i| i.hostname.as_str())
            .filter(|h| !h.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_crd_generation() {
        let crd = Grafana::crd();
        assert_eq!(crd.metadata.name.as_deref(), Some("grafanas.integreatly.org"));
        assert_eq!(crd.spec.group, "integreatly.org");
        assert_eq!(crd.spec.names.kind, "Grafana");
        assert_eq!(crd.spec.versions[0].name, "v1alpha1");
    }

    #[test]
    fn test_spec_deserializes_with_defaults() {
        let spec: GrafanaSpec = serde_json::from_value(serde_json::json!({
            "ingress": { "enabled": true, "hostname": "grafana.example.com" },
            "client": { "timeoutSeconds": 30, "preferService": true }
        }))
        .unwrap();

        assert!(spec.dashboard_label_selector.is_empty());
        assert_eq!(spec.config.server.http_port, None);
        assert_eq!(spec.client.as_ref().unwrap().timeout_seconds, Some(30));

        let grafana = Grafana::new("g", spec);
        assert!(grafana.prefer_service());
        assert!(grafana.ingress_enabled());
        assert_eq!(grafana.ingress_hostname(), Some("grafana.example.com"));
        assert_eq!(grafana.grafana_port(), DEFAULT_GRAFANA_PORT);
    }

    #[test]
    fn test_status_phase_wire_format() {
        let status = GrafanaStatus {
            phase: StatusPhase::Failing,
            message: "boom".to_string(),
            installed_dashboards: None,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["phase"], "failing");

        let back: GrafanaStatus = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(back.phase, StatusPhase::Unknown);
    }

    #[test]
    fn test_status_equality_is_structural() {
        let dashboard = GrafanaDashboardRef {
            name: "d".to_string(),
            namespace: "ns".to_string(),
            ..Default::default()
        };
        let a = GrafanaStatus {
            phase: StatusPhase::Reconciling,
            message: "success".to_string(),
            installed_dashboards: Some(vec![dashboard.clone()]),
        };
        let mut b = a.clone();
        assert_eq!(a, b);

        b.installed_dashboards = Some(vec![GrafanaDashboardRef {
            hash: "abc".to_string(),
            ..dashboard
        }]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_requires_namespace() {
        let grafana = Grafana::new("g", GrafanaSpec::default());
        assert!(matches!(grafana.key(), Err(Error::InvalidConfig(_))));

        let mut grafana = grafana;
        grafana.metadata.namespace = Some("ns".to_string());
        assert_eq!(grafana.key().unwrap(), ObjectKey::new("ns", "g"));
        assert_eq!(grafana.key().unwrap().to_string(), "ns/g");
    }
}
