//! Admin URL resolution.
//!
//! Order of preference: an OpenShift route, then an ingress, then the
//! in-cluster service. Routes and ingresses also work when the operator runs
//! outside the cluster; the service address only resolves from inside it.
//! `spec.client.preferService` skips straight to the service.

use crate::crds::Grafana;
use crate::error::{Error, Result};
use crate::state::ClusterState;
use kube::ResourceExt;

pub fn resolve_admin_url(grafana: &Grafana, state: &ClusterState) -> Result<String> {
    let prefer_service = grafana.prefer_service();

    if !prefer_service {
        if let Some(route) = &state.grafana_route {
            return Ok(format!("https://{}", route.spec.host));
        }

        if let Some(ingress) = &state.grafana_ingress {
            if let Some(hostname) = grafana.ingress_hostname() {
                return Ok(format!("https://{}", hostname));
            }

            let first = ingress
                .status
                .as_ref()
                .and_then(|s| s.load_balancer.as_ref())
                .and_then(|lb| lb.ingress.as_ref())
                .and_then(|entries| entries.first());
            if let Some(entry) = first {
                return match entry.hostname.as_deref().filter(|h| !h.is_empty()) {
                    Some(hostname) => Ok(format!("https://{}", hostname)),
                    None => Ok(format!("https://{}", entry.ip.as_deref().unwrap_or_default())),
                };
            }
        }
    }

    if let Some(service) = &state.grafana_service {
        return Ok(format!(
            "http://{}.{}.svc.cluster.local:{}",
            service.name_any(),
            grafana.namespace().unwrap_or_default(),
            grafana.grafana_port()
        ));
    }

    Err(Error::NoAdminUrl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{
        GrafanaClient, GrafanaIngress, GrafanaSpec, Route, RouteSpec, RouteTargetReference,
    };
    use k8s_openapi::api::core::v1::Service;
    use k8s_openapi::api::networking::v1::{
        Ingress, IngressLoadBalancerIngress, IngressLoadBalancerStatus, IngressStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn grafana(spec: GrafanaSpec) -> Grafana {
        let mut grafana = Grafana::new("grafana", spec);
        grafana.metadata.namespace = Some("ns".to_string());
        grafana
    }

    fn service(name: &str) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ns".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn route(host: &str) -> Route {
        Route::new(
            "grafana-route",
            RouteSpec {
                host: host.to_string(),
                to: RouteTargetReference {
                    kind: "Service".to_string(),
                    name: "grafana-service".to_string(),
                },
                ..Default::default()
            },
        )
    }

    fn ingress(entries: Vec<(Option<&str>, Option<&str>)>) -> Ingress {
        Ingress {
            status: Some(IngressStatus {
                load_balancer: Some(IngressLoadBalancerStatus {
                    ingress: Some(
                        entries
                            .into_iter()
                            .map(|(hostname, ip)| IngressLoadBalancerIngress {
                                hostname: hostname.map(str::to_string),
                                ip: ip.map(str::to_string),
                                ..Default::default()
                            })
                            .collect(),
                    ),
                }),
            }),
            ..Default::default()
        }
    }

    fn with_hostname(hostname: &str) -> GrafanaSpec {
        GrafanaSpec {
            ingress: Some(GrafanaIngress {
                enabled: true,
                hostname: hostname.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_service_fallback() {
        let state = ClusterState {
            grafana_service: Some(service("g")),
            ..Default::default()
        };
        let url = resolve_admin_url(&grafana(GrafanaSpec::default()), &state).unwrap();
        assert_eq!(url, "http://g.ns.svc.cluster.local:3000");
    }

    #[test]
    fn test_route_wins_over_ingress() {
        let state = ClusterState {
            grafana_route: Some(route("grafana.apps.example.com")),
            grafana_ingress: Some(ingress(vec![(Some("lb.example.com"), None)])),
            grafana_service: Some(service("grafana-service")),
            ..Default::default()
        };
        let url = resolve_admin_url(&grafana(with_hostname("override.example.com")), &state).unwrap();
        assert_eq!(url, "https://grafana.apps.example.com");
    }

    #[test]
    fn test_ingress_hostname_override_wins_over_load_balancer() {
        let state = ClusterState {
            grafana_ingress: Some(ingress(vec![(Some("lb.example.com"), Some("10.0.0.5"))])),
            ..Default::default()
        };
        let url = resolve_admin_url(&grafana(with_hostname("grafana.example.com")), &state).unwrap();
        assert_eq!(url, "https://grafana.example.com");
    }

    #[test]
    fn test_ingress_load_balancer_ip() {
        let state = ClusterState {
            grafana_ingress: Some(ingress(vec![(None, Some("10.0.0.5"))])),
            ..Default::default()
        };
        let url = resolve_admin_url(&grafana(GrafanaSpec::default()), &state).unwrap();
        assert_eq!(url, "https://10.0.0.5");
    }

    #[test]
    fn test_only_first_load_balancer_entry_is_used() {
        let state = ClusterState {
            grafana_ingress: Some(ingress(vec![
                (Some(""), Some("10.0.0.5")),
                (Some("second.example.com"), None),
            ])),
            ..Default::default()
        };
        let url = resolve_admin_url(&grafana(GrafanaSpec::default()), &state).unwrap();
        assert_eq!(url, "https://10.0.0.5");
    }

    #[test]
    fn test_ingress_without_address_falls_back_to_service() {
        let state = ClusterState {
            grafana_ingress: Some(ingress(vec![])),
            grafana_service: Some(service("grafana-service")),
            ..Default::default()
        };
        let url = resolve_admin_url(&grafana(GrafanaSpec::default()), &state).unwrap();
        assert_eq!(url, "http://grafana-service.ns.svc.cluster.local:3000");
    }

    #[test]
    fn test_prefer_service_skips_route_and_ingress() {
        let spec = GrafanaSpec {
            client: Some(GrafanaClient {
                timeout_seconds: None,
                prefer_service: Some(true),
            }),
            ..with_hostname("grafana.example.com")
        };
        let state = ClusterState {
            grafana_route: Some(route("grafana.apps.example.com")),
            grafana_ingress: Some(ingress(vec![(None, Some("10.0.0.5"))])),
            grafana_service: Some(service("grafana-service")),
            ..Default::default()
        };
        let url = resolve_admin_url(&grafana(spec), &state).unwrap();
        assert_eq!(url, "http://grafana-service.ns.svc.cluster.local:3000");
    }

    #[test]
    fn test_nothing_available() {
        let err = resolve_admin_url(&grafana(GrafanaSpec::default()), &ClusterState::new()).unwrap_err();
        assert!(matches!(err, Error::NoAdminUrl));

        let spec = GrafanaSpec {
            client: Some(GrafanaClient {
                timeout_seconds: None,
                prefer_service: Some(true),
            }),
            ..Default::default()
        };
        let state = ClusterState {
            grafana_route: Some(route("grafana.apps.example.com")),
            ..Default::default()
        };
        assert!(matches!(
            resolve_admin_url(&grafana(spec), &state),
            Err(Error::NoAdminUrl)
        ));
    }
}
