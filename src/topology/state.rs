//! Cluster topology snapshot model.
//!
//! [`Cluster`] is a pure value describing the observable ingress surface of a
//! Kubernetes cluster at a point in time. Entities live in flat mappings
//! keyed by cluster-global composite keys (`name@namespace` for namespaced
//! resources, `kind/name@namespace` for workloads) so that a JSON Merge Patch
//! can express entity deletion as a single top-level `null`.
//!
//! # Canonical encoding
//!
//! [`Cluster::encode`] produces the byte form submitted to the platform. The
//! encoding is canonical: identical logical contents always yield identical
//! bytes (object keys sorted, stable omission rules), which is what lets the
//! sync engine detect "no change" by byte comparison. Two rules matter for
//! merge-patch semantics:
//!
//! - Top-level sub-components (the overview and the entity mappings) are
//!   always present, even when empty, so removing an entity diffs to
//!   `{"key": null}` rather than deleting the whole mapping.
//! - Record-level empty strings, sequences, and mappings are omitted, because
//!   an explicit empty container would turn into a spurious `null` deletion on
//!   the next diff.

use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1 as netv1;
use serde::{Deserialize, Serialize};

/// Builds the cluster-global key of a namespaced resource.
pub fn resource_key(name: &str, namespace: &str) -> String {
    format!("{name}@{namespace}")
}

/// Builds the cluster-global key of a workload, disambiguated by kind.
pub fn workload_key(kind: &str, name: &str, namespace: &str) -> String {
    format!("{kind}/{name}@{namespace}")
}

/// Point-in-time description of a cluster's ingress topology.
///
/// `ingresses` and `ingress_routes` are carried for producers and for
/// deriving the overview counts, but are excluded from the wire encoding:
/// the platform tracks them through a separate channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cluster {
    /// Platform identifier of the cluster, assigned at link time.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Aggregate counts and controller types.
    pub overview: Overview,
    /// Names of all namespaces, sorted.
    pub namespaces: Vec<String>,
    /// Workloads, keyed by `kind/name@namespace`.
    pub apps: BTreeMap<String, App>,
    /// Services, keyed by `name@namespace`.
    pub services: BTreeMap<String, Service>,
    /// Workloads acting as ingress controllers, keyed by `kind/name@namespace`.
    pub ingress_controllers: BTreeMap<String, IngressController>,
    /// Access-control policies, keyed by `name@namespace`.
    pub access_control_policies: BTreeMap<String, AccessControlPolicy>,
    /// TLS option sets, keyed by `name@namespace`.
    pub tls_options: BTreeMap<String, TlsOptions>,

    /// Kubernetes Ingresses, keyed by `name@namespace`. Not encoded.
    #[serde(skip)]
    pub ingresses: BTreeMap<String, Ingress>,
    /// Traefik IngressRoutes, keyed by `name@namespace`. Not encoded.
    #[serde(skip)]
    pub ingress_routes: BTreeMap<String, IngressRoute>,
}

impl Cluster {
    /// Canonical byte encoding of the snapshot.
    ///
    /// Serialization goes through a `serde_json::Value` so that object keys
    /// come out sorted; the result is byte-stable for identical contents.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        let value = serde_json::to_value(self)?;
        serde_json::to_vec(&value)
    }
}

/// Aggregate view of the cluster resources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Overview {
    /// Number of ingresses and ingress routes.
    pub ingress_count: usize,
    /// Number of services.
    pub service_count: usize,
    /// Detected ingress controller types, sorted and deduplicated.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ingress_controller_types: Vec<String>,
}

/// Abstraction of Deployments, StatefulSets, DaemonSets and ReplicaSets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct App {
    /// Workload name.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Workload kind (`Deployment`, `StatefulSet`, ...).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub kind: String,
    /// Namespace the workload lives in.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Desired replica count.
    pub replicas: i32,
    /// Replicas currently ready.
    pub ready_replicas: i32,
    /// Container images run by the workload.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    /// Workload labels.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// A workload identified as the cluster's ingress controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngressController {
    /// The underlying workload.
    #[serde(flatten)]
    pub app: App,
    /// Controller type (`traefik`, `nginx`, ...).
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub controller_type: String,
    /// Ingress classes served by this controller.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ingress_classes: Vec<String>,
    /// Metrics endpoints exposed by the controller.
    #[serde(rename = "metricsURLs", skip_serializing_if = "Vec::is_empty")]
    pub metrics_urls: Vec<String>,
    /// Publicly reachable endpoints.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub public_endpoints: Vec<String>,
    /// Cluster-internal endpoints.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<String>,
}

/// A Kubernetes Service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Service {
    /// Service name.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Namespace the service lives in.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Platform identifier of the owning cluster.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cluster_id: String,
    /// Service type (`ClusterIP`, `LoadBalancer`, ...).
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub service_type: String,
    /// Pod selector.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub selector: BTreeMap<String, String>,
    /// Keys of the workloads selected by this service.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub apps: Vec<String>,
    /// Service annotations.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Externally reachable IPs.
    #[serde(rename = "externalIPs", skip_serializing_if = "Vec::is_empty")]
    pub external_ips: Vec<String>,
    /// Externally reachable ports. Treated as an atomic value: any change
    /// replaces the whole list.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub external_ports: Vec<i32>,
}

/// Metadata identifying a Kubernetes resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceMeta {
    /// Resource kind.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub kind: String,
    /// API group of the resource.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub group: String,
    /// Resource name.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Namespace the resource lives in.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

/// Ingress properties shared by Ingresses and IngressRoutes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngressMeta {
    /// Platform identifier of the owning cluster.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cluster_id: String,
    /// Type of the controller serving this ingress.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub controller_type: String,
    /// Ingress annotations.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// A Kubernetes Ingress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Ingress {
    /// Identity of the resource.
    #[serde(flatten)]
    pub resource: ResourceMeta,
    /// Shared ingress properties.
    #[serde(flatten)]
    pub meta: IngressMeta,
    /// Referenced ingress class, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,
    /// TLS configuration blocks.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tls: Vec<netv1::IngressTLS>,
    /// Routing rules.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<netv1::IngressRule>,
    /// Backend used when no rule matches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_backend: Option<netv1::IngressBackend>,
    /// Keys of the services this ingress routes to.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
}

/// A Traefik IngressRoute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngressRoute {
    /// Identity of the resource.
    #[serde(flatten)]
    pub resource: ResourceMeta,
    /// Shared ingress properties.
    #[serde(flatten)]
    pub meta: IngressMeta,
    /// TLS configuration, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<IngressRouteTls>,
    /// Match rules.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
    /// Keys of the services this route targets.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
}

/// Simplified TLS configuration of an IngressRoute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngressRouteTls {
    /// Domains covered by the certificate.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,
    /// Secret holding the certificate.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub secret_name: String,
    /// Referenced TLS options, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<TlsOptionRef>,
}

/// Reference to a [`TlsOptions`] entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TlsOptionRef {
    /// Name of the TLS options resource.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Namespace of the TLS options resource.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

/// One match rule of an IngressRoute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Route {
    /// Rule expression, e.g. `` Host(`example.com`) ``.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub r#match: String,
    /// Services targeted by the rule.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<RouteService>,
}

/// A service targeted by an IngressRoute rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteService {
    /// Namespace of the target service.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Name of the target service.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Target port by name, if set.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub port_name: String,
    /// Target port by number, if set.
    #[serde(skip_serializing_if = "is_zero_i32")]
    pub port_number: i32,
}

/// An access-control policy configured within the cluster.
///
/// The authentication method is a variant payload: exactly one of the JWT,
/// basic-auth or OIDC arms is active, and the encoder omits the inactive arms
/// entirely so that switching methods diffs to `{"old": null, "new": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessControlPolicy {
    /// Policy name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Namespace the policy lives in.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Platform identifier of the owning cluster.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_id: String,
    /// The active authentication method and its settings.
    #[serde(flatten)]
    pub config: AccessControlPolicyConfig,
}

/// Authentication method of an [`AccessControlPolicy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessControlPolicyConfig {
    /// JWT bearer-token authentication.
    Jwt(AccessControlPolicyJwt),
    /// HTTP basic authentication.
    BasicAuth(AccessControlPolicyBasicAuth),
    /// OpenID Connect authentication.
    Oidc(AccessControlPolicyOidc),
}

impl AccessControlPolicyConfig {
    /// Name of the active authentication method.
    pub fn method(&self) -> &'static str {
        match self {
            AccessControlPolicyConfig::Jwt(_) => "jwt",
            AccessControlPolicyConfig::BasicAuth(_) => "basicAuth",
            AccessControlPolicyConfig::Oidc(_) => "oidc",
        }
    }
}

/// Settings for JWT authentication within an access-control policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessControlPolicyJwt {
    /// Shared signing secret.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub signing_secret: String,
    /// Whether the signing secret is base64-encoded.
    pub signing_secret_base64_encoded: bool,
    /// PEM public key used to verify signatures.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub public_key: String,
    /// Path of a JWKs file.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub jwks_file: String,
    /// URL of a JWKs endpoint.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub jwks_url: String,
    /// Strip the Authorization header before forwarding.
    #[serde(skip_serializing_if = "is_false")]
    pub strip_authorization_header: bool,
    /// Headers to forward, populated from token claims.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub forward_headers: BTreeMap<String, String>,
    /// Query parameter carrying the token, if not a header.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub token_query_key: String,
    /// Claim validation expression.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub claims: String,
}

/// Settings for HTTP basic authentication within an access-control policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessControlPolicyBasicAuth {
    /// Colon-separated `user:hash` entries.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub users: String,
    /// Authentication realm.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub realm: String,
    /// Strip the Authorization header before forwarding.
    #[serde(skip_serializing_if = "is_false")]
    pub strip_authorization_header: bool,
    /// Header carrying the authenticated user name.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub forward_username_header: String,
}

/// Settings for OpenID Connect authentication within an access-control policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessControlPolicyOidc {
    /// Issuer URL.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub issuer: String,
    /// OAuth2 client identifier.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub client_id: String,
    /// OAuth2 client secret.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub client_secret: String,
    /// Redirect URL after authentication.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub redirect_url: String,
    /// Logout URL.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub logout_url: String,
    /// Requested scopes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    /// Extra authorization request parameters.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub auth_params: BTreeMap<String, String>,
    /// Headers to forward, populated from ID token claims.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub forward_headers: BTreeMap<String, String>,
    /// Claim validation expression.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub claims: String,
}

/// A TLS options set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TlsOptions {
    /// Resource name.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Namespace the resource lives in.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Minimum accepted TLS version.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub min_version: String,
    /// Maximum accepted TLS version.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub max_version: String,
    /// Accepted cipher suites.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cipher_suites: Vec<String>,
    /// Preferred elliptic curves.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub curve_preferences: Vec<String>,
    /// Client certificate requirements.
    pub client_auth: ClientAuth,
    /// Reject connections without a matching SNI.
    pub sni_strict: bool,
    /// Prefer the server's cipher suite order.
    pub prefer_server_cipher_suites: bool,
}

/// Client certificate requirements of a [`TlsOptions`] set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientAuth {
    /// Secrets holding the accepted CA certificates.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secret_names: Vec<String>,
    /// Client authentication mode.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub client_auth_type: String,
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero_i32(value: &i32) -> bool {
    *value == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(cluster: &Cluster) -> String {
        String::from_utf8(cluster.encode().unwrap()).unwrap()
    }

    #[test]
    fn test_empty_cluster_keeps_top_level_shape() {
        let got = encoded(&Cluster::default());

        // Sub-component mappings stay present even when empty so that entity
        // deletion diffs to a per-key null, and the empty id is omitted.
        assert_eq!(
            got,
            r#"{"accessControlPolicies":{},"apps":{},"ingressControllers":{},"namespaces":[],"overview":{"ingressCount":0,"serviceCount":0},"services":{},"tlsOptions":{}}"#
        );
    }

    #[test]
    fn test_service_record_omits_empty_fields() {
        let mut cluster = Cluster::default();
        cluster.overview.service_count = 1;
        cluster.services.insert(
            resource_key("service-1", "ns"),
            Service {
                name: "service-1".to_string(),
                namespace: "ns".to_string(),
                service_type: "ClusterIP".to_string(),
                annotations: BTreeMap::from([("key".to_string(), "value".to_string())]),
                external_ips: vec!["10.10.10.10".to_string()],
                external_ports: vec![8080],
                ..Default::default()
            },
        );

        let got = encoded(&cluster);
        assert!(got.contains(
            r#""service-1@ns":{"annotations":{"key":"value"},"externalIPs":["10.10.10.10"],"externalPorts":[8080],"name":"service-1","namespace":"ns","type":"ClusterIP"}"#
        ));
        assert!(!got.contains("clusterId"));
        assert!(!got.contains("selector"));
        assert!(!got.contains("\"apps\":["));
    }

    #[test]
    fn test_encoding_is_stable_across_insertion_order() {
        let mut first = Cluster::default();
        first
            .namespaces
            .extend(["default".to_string(), "kube-system".to_string()]);
        first.services.insert(
            "a@ns".to_string(),
            Service {
                name: "a".to_string(),
                ..Default::default()
            },
        );
        first.services.insert(
            "b@ns".to_string(),
            Service {
                name: "b".to_string(),
                ..Default::default()
            },
        );

        let mut second = Cluster::default();
        second
            .namespaces
            .extend(["default".to_string(), "kube-system".to_string()]);
        // Reverse insertion order; the mapping still encodes sorted.
        second.services.insert(
            "b@ns".to_string(),
            Service {
                name: "b".to_string(),
                ..Default::default()
            },
        );
        second.services.insert(
            "a@ns".to_string(),
            Service {
                name: "a".to_string(),
                ..Default::default()
            },
        );

        assert_eq!(first.encode().unwrap(), second.encode().unwrap());
    }

    #[test]
    fn test_ingresses_are_not_encoded() {
        let mut cluster = Cluster::default();
        cluster.overview.ingress_count = 1;
        cluster.ingresses.insert(
            resource_key("ingress-1", "ns"),
            Ingress {
                resource: ResourceMeta {
                    name: "ingress-1".to_string(),
                    namespace: "ns".to_string(),
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        cluster.ingress_routes.insert(
            resource_key("route-1", "ns"),
            IngressRoute::default(),
        );

        let got = encoded(&cluster);
        assert!(!got.contains("ingresses"));
        assert!(!got.contains("ingressRoutes"));
        // The counts still reflect them.
        assert!(got.contains(r#""ingressCount":1"#));
    }

    #[test]
    fn test_access_control_policy_encodes_single_arm() {
        let policy = AccessControlPolicy {
            name: "policy".to_string(),
            namespace: "ns".to_string(),
            cluster_id: String::new(),
            config: AccessControlPolicyConfig::Jwt(AccessControlPolicyJwt {
                signing_secret: "secret".to_string(),
                ..Default::default()
            }),
        };

        let got = serde_json::to_value(&policy).unwrap();
        assert!(got.get("jwt").is_some());
        assert!(got.get("basicAuth").is_none());
        assert!(got.get("oidc").is_none());
        assert_eq!(policy.config.method(), "jwt");
    }

    #[test]
    fn test_access_control_policy_round_trips() {
        let policy = AccessControlPolicy {
            name: "policy".to_string(),
            namespace: "ns".to_string(),
            cluster_id: "cluster-1".to_string(),
            config: AccessControlPolicyConfig::BasicAuth(AccessControlPolicyBasicAuth {
                users: "user:hash".to_string(),
                realm: "realm".to_string(),
                ..Default::default()
            }),
        };

        let bytes = serde_json::to_vec(&policy).unwrap();
        let decoded: AccessControlPolicy = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, policy);
    }

    #[test]
    fn test_decode_tolerates_unknown_fields() {
        let raw = r#"{
            "overview": {"ingressCount": 2, "serviceCount": 1, "unknown": true},
            "services": {
                "service-1@ns": {"name": "service-1", "namespace": "ns", "extra": "field"}
            },
            "transient": {}
        }"#;

        let cluster: Cluster = serde_json::from_str(raw).unwrap();
        assert_eq!(cluster.overview.service_count, 1);
        assert_eq!(cluster.services["service-1@ns"].name, "service-1");
    }

    #[test]
    fn test_composite_keys() {
        assert_eq!(resource_key("service-1", "ns"), "service-1@ns");
        assert_eq!(
            workload_key("Deployment", "web", "default"),
            "Deployment/web@default"
        );
    }
}
