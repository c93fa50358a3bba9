//! Kubernetes snapshot producer.
//!
//! Polls the Kubernetes API on an interval, assembles a [`Cluster`] snapshot
//! from the listed objects, and hands it to the [`Store`]. The watcher is the
//! single writer of the store: snapshots are produced and written from one
//! task, on a throttled cadence.

use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::api::networking::v1 as netv1;
use kube::api::{Api, ListParams};
use kube::Client as KubeClient;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::platform::TopologyClient;
use crate::topology::state::{
    resource_key, workload_key, App, Cluster, Ingress, IngressController, IngressMeta,
    ResourceMeta, Service,
};
use crate::topology::store::Store;

/// Container image substrings identifying known ingress controllers.
const CONTROLLER_IMAGES: &[(&str, &str)] = &[
    ("traefik", "traefik"),
    ("ingress-nginx/controller", "nginx-community"),
    ("nginx/nginx-ingress", "nginx"),
    ("haproxy-ingress", "haproxy-community"),
];

/// IngressClass controller names of known ingress controllers.
const CONTROLLER_CLASSES: &[(&str, &str)] = &[
    ("traefik.io/ingress-controller", "traefik"),
    ("k8s.io/ingress-nginx", "nginx-community"),
    ("nginx.org/ingress-controller", "nginx"),
    ("haproxy-ingress.github.io/controller", "haproxy-community"),
];

/// Objects listed from the cluster on one tick.
#[derive(Default)]
struct ClusterObjects {
    namespaces: Vec<corev1::Namespace>,
    deployments: Vec<appsv1::Deployment>,
    stateful_sets: Vec<appsv1::StatefulSet>,
    daemon_sets: Vec<appsv1::DaemonSet>,
    services: Vec<corev1::Service>,
    ingresses: Vec<netv1::Ingress>,
    ingress_classes: Vec<netv1::IngressClass>,
}

/// Periodically assembles topology snapshots and writes them to the platform.
pub struct Watcher {
    cluster_id: String,
    interval: Duration,
}

impl Watcher {
    /// Creates a watcher producing snapshots for the given cluster on the
    /// given cadence.
    pub fn new(cluster_id: impl Into<String>, interval: Duration) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            interval,
        }
    }

    /// Runs until the shutdown signal fires.
    ///
    /// A failed tick (listing or synchronization) is logged and retried on
    /// the next tick; the loop itself never gives up.
    pub async fn run<C: TopologyClient>(
        &self,
        kube: KubeClient,
        store: &mut Store<C>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        info!(interval_secs = self.interval.as_secs(), "Topology watcher starting");
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = match self.snapshot(&kube).await {
                        Ok(snapshot) => snapshot,
                        Err(err) => {
                            warn!(error = %err, "Failed to assemble topology snapshot");
                            continue;
                        }
                    };

                    match store.write(&snapshot).await {
                        Ok(()) => debug!(
                            services = snapshot.services.len(),
                            ingresses = snapshot.ingresses.len(),
                            "Topology synchronized"
                        ),
                        Err(err) => warn!(error = %err, "Failed to synchronize topology"),
                    }
                }
                _ = &mut shutdown => {
                    info!("Stopping topology watcher");
                    return;
                }
            }
        }
    }

    /// Lists cluster objects and assembles a snapshot.
    pub async fn snapshot(&self, kube: &KubeClient) -> Result<Cluster, kube::Error> {
        let params = ListParams::default();

        let objects = ClusterObjects {
            namespaces: Api::all(kube.clone()).list(&params).await?.items,
            deployments: Api::all(kube.clone()).list(&params).await?.items,
            stateful_sets: Api::all(kube.clone()).list(&params).await?.items,
            daemon_sets: Api::all(kube.clone()).list(&params).await?.items,
            services: Api::all(kube.clone()).list(&params).await?.items,
            ingresses: Api::all(kube.clone()).list(&params).await?.items,
            ingress_classes: Api::all(kube.clone()).list(&params).await?.items,
        };

        Ok(build_cluster(&self.cluster_id, objects))
    }
}

/// Assembles a snapshot from listed objects.
fn build_cluster(cluster_id: &str, objects: ClusterObjects) -> Cluster {
    let mut cluster = Cluster {
        id: cluster_id.to_string(),
        ..Default::default()
    };

    cluster.namespaces = objects
        .namespaces
        .iter()
        .filter_map(|ns| ns.metadata.name.clone())
        .collect();
    cluster.namespaces.sort();

    for app in objects
        .deployments
        .iter()
        .filter_map(app_from_deployment)
        .chain(objects.stateful_sets.iter().filter_map(app_from_stateful_set))
        .chain(objects.daemon_sets.iter().filter_map(app_from_daemon_set))
    {
        cluster
            .apps
            .insert(workload_key(&app.kind, &app.name, &app.namespace), app);
    }

    for svc in &objects.services {
        if let Some((key, service)) = service_from(svc, &cluster.apps, cluster_id) {
            cluster.services.insert(key, service);
        }
    }

    for (key, app) in &cluster.apps {
        if let Some(controller_type) = controller_type(app) {
            let endpoints = controller_endpoints(app, &cluster.services);
            cluster.ingress_controllers.insert(
                key.clone(),
                IngressController {
                    app: app.clone(),
                    controller_type: controller_type.to_string(),
                    ingress_classes: classes_for(controller_type, &objects.ingress_classes),
                    public_endpoints: endpoints.clone(),
                    endpoints,
                    ..Default::default()
                },
            );
        }
    }

    for ingress in &objects.ingresses {
        if let Some((key, ingress)) = ingress_from(ingress, cluster_id) {
            cluster.ingresses.insert(key, ingress);
        }
    }

    let mut controller_types: Vec<String> = cluster
        .ingress_controllers
        .values()
        .map(|controller| controller.controller_type.clone())
        .collect();
    controller_types.sort();
    controller_types.dedup();

    cluster.overview = crate::topology::state::Overview {
        ingress_count: cluster.ingresses.len() + cluster.ingress_routes.len(),
        service_count: cluster.services.len(),
        ingress_controller_types: controller_types,
    };

    cluster
}

fn app_from_deployment(deployment: &appsv1::Deployment) -> Option<App> {
    Some(App {
        name: deployment.metadata.name.clone()?,
        kind: "Deployment".to_string(),
        namespace: deployment.metadata.namespace.clone()?,
        replicas: deployment.spec.as_ref().and_then(|spec| spec.replicas).unwrap_or(0),
        ready_replicas: deployment
            .status
            .as_ref()
            .and_then(|status| status.ready_replicas)
            .unwrap_or(0),
        images: deployment
            .spec
            .as_ref()
            .map(|spec| container_images(&spec.template))
            .unwrap_or_default(),
        labels: deployment.metadata.labels.clone().unwrap_or_default(),
    })
}

fn app_from_stateful_set(stateful_set: &appsv1::StatefulSet) -> Option<App> {
    Some(App {
        name: stateful_set.metadata.name.clone()?,
        kind: "StatefulSet".to_string(),
        namespace: stateful_set.metadata.namespace.clone()?,
        replicas: stateful_set
            .spec
            .as_ref()
            .and_then(|spec| spec.replicas)
            .unwrap_or(0),
        ready_replicas: stateful_set
            .status
            .as_ref()
            .and_then(|status| status.ready_replicas)
            .unwrap_or(0),
        images: stateful_set
            .spec
            .as_ref()
            .map(|spec| container_images(&spec.template))
            .unwrap_or_default(),
        labels: stateful_set.metadata.labels.clone().unwrap_or_default(),
    })
}

fn app_from_daemon_set(daemon_set: &appsv1::DaemonSet) -> Option<App> {
    Some(App {
        name: daemon_set.metadata.name.clone()?,
        kind: "DaemonSet".to_string(),
        namespace: daemon_set.metadata.namespace.clone()?,
        replicas: daemon_set
            .status
            .as_ref()
            .map(|status| status.desired_number_scheduled)
            .unwrap_or(0),
        ready_replicas: daemon_set
            .status
            .as_ref()
            .map(|status| status.number_ready)
            .unwrap_or(0),
        images: daemon_set
            .spec
            .as_ref()
            .map(|spec| container_images(&spec.template))
            .unwrap_or_default(),
        labels: daemon_set.metadata.labels.clone().unwrap_or_default(),
    })
}

fn container_images(template: &corev1::PodTemplateSpec) -> Vec<String> {
    template
        .spec
        .iter()
        .flat_map(|spec| spec.containers.iter())
        .filter_map(|container| container.image.clone())
        .collect()
}

/// The ingress controller type implemented by this workload, if any.
fn controller_type(app: &App) -> Option<&'static str> {
    app.images.iter().find_map(|image| {
        CONTROLLER_IMAGES
            .iter()
            .find(|(needle, _)| image.contains(needle))
            .map(|(_, controller)| *controller)
    })
}

/// Names of the ingress classes served by a controller type.
fn classes_for(controller: &str, classes: &[netv1::IngressClass]) -> Vec<String> {
    let mut names: Vec<String> = classes
        .iter()
        .filter(|class| {
            class
                .spec
                .as_ref()
                .and_then(|spec| spec.controller.as_deref())
                .and_then(|name| {
                    CONTROLLER_CLASSES
                        .iter()
                        .find(|(controller_name, _)| *controller_name == name)
                })
                .is_some_and(|(_, mapped)| *mapped == controller)
        })
        .filter_map(|class| class.metadata.name.clone())
        .collect();
    names.sort();
    names
}

/// External IPs of the services exposing this workload.
fn controller_endpoints(app: &App, services: &BTreeMap<String, Service>) -> Vec<String> {
    let key = workload_key(&app.kind, &app.name, &app.namespace);
    let mut endpoints: Vec<String> = services
        .values()
        .filter(|service| service.apps.contains(&key))
        .flat_map(|service| service.external_ips.iter().cloned())
        .collect();
    endpoints.sort();
    endpoints.dedup();
    endpoints
}

fn service_from(
    service: &corev1::Service,
    apps: &BTreeMap<String, App>,
    cluster_id: &str,
) -> Option<(String, Service)> {
    let name = service.metadata.name.clone()?;
    let namespace = service.metadata.namespace.clone()?;
    let spec = service.spec.clone().unwrap_or_default();

    let selector: BTreeMap<String, String> = spec.selector.unwrap_or_default();
    let selected = selected_apps(apps, &namespace, &selector);

    let mut external_ips: Vec<String> = spec.external_ips.unwrap_or_default();
    for ingress in service
        .status
        .iter()
        .filter_map(|status| status.load_balancer.as_ref())
        .flat_map(|lb| lb.ingress.iter().flatten())
    {
        if let Some(ip) = &ingress.ip {
            external_ips.push(ip.clone());
        } else if let Some(hostname) = &ingress.hostname {
            external_ips.push(hostname.clone());
        }
    }

    let service_type = spec.type_.unwrap_or_default();
    let external_ports: Vec<i32> = match service_type.as_str() {
        // Only these types are reachable from outside the cluster.
        "LoadBalancer" | "NodePort" => spec.ports.iter().flatten().map(|port| port.port).collect(),
        _ => Vec::new(),
    };

    let key = resource_key(&name, &namespace);
    Some((
        key,
        Service {
            name,
            namespace,
            cluster_id: cluster_id.to_string(),
            service_type,
            selector,
            apps: selected,
            annotations: service.metadata.annotations.clone().unwrap_or_default(),
            external_ips,
            external_ports,
        },
    ))
}

/// Keys of the workloads selected by a service selector.
fn selected_apps(
    apps: &BTreeMap<String, App>,
    namespace: &str,
    selector: &BTreeMap<String, String>,
) -> Vec<String> {
    if selector.is_empty() {
        return Vec::new();
    }

    apps.values()
        .filter(|app| app.namespace == namespace)
        .filter(|app| {
            selector
                .iter()
                .all(|(key, value)| app.labels.get(key) == Some(value))
        })
        .map(|app| workload_key(&app.kind, &app.name, &app.namespace))
        .collect()
}

fn ingress_from(ingress: &netv1::Ingress, cluster_id: &str) -> Option<(String, Ingress)> {
    let name = ingress.metadata.name.clone()?;
    let namespace = ingress.metadata.namespace.clone()?;
    let spec = ingress.spec.clone().unwrap_or_default();

    let mut services: Vec<String> = spec
        .rules
        .iter()
        .flatten()
        .flat_map(|rule| rule.http.iter())
        .flat_map(|http| http.paths.iter())
        .filter_map(|path| path.backend.service.as_ref())
        .map(|backend| resource_key(&backend.name, &namespace))
        .collect();
    if let Some(backend) = spec
        .default_backend
        .as_ref()
        .and_then(|backend| backend.service.as_ref())
    {
        services.push(resource_key(&backend.name, &namespace));
    }
    services.sort();
    services.dedup();

    let key = resource_key(&name, &namespace);
    Some((
        key,
        Ingress {
            resource: ResourceMeta {
                kind: "Ingress".to_string(),
                group: "networking.k8s.io".to_string(),
                name,
                namespace,
            },
            meta: IngressMeta {
                cluster_id: cluster_id.to_string(),
                annotations: ingress.metadata.annotations.clone().unwrap_or_default(),
                ..Default::default()
            },
            ingress_class_name: spec.ingress_class_name,
            tls: spec.tls.unwrap_or_default(),
            rules: spec.rules.unwrap_or_default(),
            default_backend: spec.default_backend,
            services,
        },
    ))
}
