//! # Child Resources
//!
//! Builders for the Kubernetes objects that make up a Grafana instance.

use crate::crds::{Grafana, Route, RoutePort, RouteSpec, RouteTargetReference, RouteTls};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, HTTPGetAction, PodSpec, PodTemplateSpec, Probe, Service,
    ServicePort, ServiceSpec,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

pub const GRAFANA_SERVICE_NAME: &str = "grafana-service";
pub const GRAFANA_DEPLOYMENT_NAME: &str = "grafana-deployment";
pub const GRAFANA_INGRESS_NAME: &str = "grafana-ingress";
pub const GRAFANA_ROUTE_NAME: &str = "grafana-route";

pub const DEFAULT_GRAFANA_IMAGE: &str = "docker.io/grafana/grafana:9.5.2";

const HTTP_PORT_NAME: &str = "grafana";

/// Labels shared by every child of a Grafana instance
pub fn grafana_labels(grafana: &Grafana) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), "grafana".to_string()),
        ("app.kubernetes.io/instance".to_string(), grafana.name_any()),
        (
            "app.kubernetes.io/managed-by".to_string(),
            "grafana-operator".to_string(),
        ),
    ])
}

fn child_metadata(
    grafana: &Grafana,
    name: &str,
    extra_labels: &BTreeMap<String, String>,
    annotations: &BTreeMap<String, String>,
) -> ObjectMeta {
    let mut labels = grafana_labels(grafana);
    labels.extend(extra_labels.clone());
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: grafana.namespace(),
        labels: Some(labels),
        annotations: if annotations.is_empty() {
            None
        } else {
            Some(annotations.clone())
        },
        owner_references: grafana.controller_owner_ref(&()).map(|owner| vec![owner]),
        ..Default::default()
    }
}

pub fn build_service(grafana: &Grafana) -> Service {
    let port = i32::from(grafana.grafana_port());
    let service_spec = grafana.spec.service.clone().unwrap_or_default();

    Service {
        metadata: child_metadata(
            grafana,
            GRAFANA_SERVICE_NAME,
            &service_spec.labels,
            &service_spec.annotations,
        ),
        spec: Some(ServiceSpec {
            selector: Some(grafana_labels(grafana)),
            ports: Some(vec![ServicePort {
                name: Some(HTTP_PORT_NAME.to_string()),
                port,
                target_port: Some(IntOrString::Int(port)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            type_: Some(service_spec.type_.unwrap_or_else(|| "ClusterIP".to_string())),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn build_deployment(grafana: &Grafana) -> Deployment {
    let labels = grafana_labels(grafana);
    let port = i32::from(grafana.grafana_port());
    let deployment_spec = grafana.spec.deployment.clone().unwrap_or_default();

    let container = Container {
        name: "grafana".to_string(),
        image: Some(
            deployment_spec
                .image
                .unwrap_or_else(|| DEFAULT_GRAFANA_IMAGE.to_string()),
        ),
        ports: Some(vec![ContainerPort {
            name: Some(HTTP_PORT_NAME.to_string()),
            container_port: port,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        readiness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some("/api/health".to_string()),
                port: IntOrString::Int(port),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    Deployment {
        metadata: child_metadata(
            grafana,
            GRAFANA_DEPLOYMENT_NAME,
            &BTreeMap::new(),
            &deployment_spec.annotations,
        ),
        spec: Some(DeploymentSpec {
            replicas: Some(deployment_spec.replicas.unwrap_or(1)),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Ingress for the instance; `None` when the spec does not enable one
pub fn build_ingress(grafana: &Grafana) -> Option<Ingress> {
    if !grafana.ingress_enabled() {
        return None;
    }
    let ingress_spec = grafana.spec.ingress.as_ref()?;
    let host = grafana.ingress_hostname().map(str::to_string);

    let rule = IngressRule {
        host: host.clone(),
        http: Some(HTTPIngressRuleValue {
            paths: vec![HTTPIngressPath {
                path: Some(ingress_spec.path.clone().unwrap_or_else(|| "/".to_string())),
                path_type: "Prefix".to_string(),
                backend: IngressBackend {
                    service: Some(IngressServiceBackend {
                        name: GRAFANA_SERVICE_NAME.to_string(),
                        port: Some(ServiceBackendPort {
                            number: Some(i32::from(grafana.grafana_port())),
                            ..Default::default()
                        }),
                    }),
                    ..Default::default()
                },
            }],
        }),
    };

    let tls = ingress_spec.tls_enabled.then(|| {
        vec![IngressTLS {
            hosts: host.map(|h| vec![h]),
            secret_name: ingress_spec.tls_secret_name.clone(),
        }]
    });

    Some(Ingress {
        metadata: child_metadata(
            grafana,
            GRAFANA_INGRESS_NAME,
            &ingress_spec.labels,
            &ingress_spec.annotations,
        ),
        spec: Some(IngressSpec {
            ingress_class_name: ingress_spec.ingress_class_name.clone(),
            rules: Some(vec![rule]),
            tls,
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Edge-terminated route to the Grafana service; the router assigns the host
/// unless the ingress spec pins one
pub fn build_route(grafana: &Grafana) -> Route {
    let ingress_spec = grafana.spec.ingress.clone().unwrap_or_default();

    let mut route = Route::new(
        GRAFANA_ROUTE_NAME,
        RouteSpec {
            host: grafana.ingress_hostname().unwrap_or_default().to_string(),
            path: ingress_spec.path.clone(),
            to: RouteTargetReference {
                kind: "Service".to_string(),
                name: GRAFANA_SERVICE_NAME.to_string(),
            },
            port: Some(RoutePort {
                target_port: HTTP_PORT_NAME.to_string(),
            }),
            tls: Some(RouteTls {
                termination: "edge".to_string(),
            }),
        },
    );
    route.metadata = child_metadata(
        grafana,
        GRAFANA_ROUTE_NAME,
        &ingress_spec.labels,
        &ingress_spec.annotations,
    );
    route
}
