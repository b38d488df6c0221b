//! Typed cluster resources and the translation from service specs.
//!
//! Only the fields the compiler emits are modelled. Every map is a
//! `BTreeMap` so rendering is deterministic.

use std::collections::BTreeMap;

use serde::Serialize;
use topo_spec as model;

/// Default image for the shard router.
pub const SHARDER_IMAGE: &str = "brendanburns/sharder";

/// Label key tying pods to their controllers and services.
pub const APP_LABEL: &str = "app";

/// Scheme used for per-shard addresses.
const SHARD_SCHEME: &str = "http";

// =============================================================================
// Resource kinds
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResourceKind {
    Deployment,
    StatefulSet,
    Service,
}

impl ResourceKind {
    pub fn api_version(self) -> &'static str {
        match self {
            ResourceKind::Deployment | ResourceKind::StatefulSet => "apps/v1",
            ResourceKind::Service => "v1",
        }
    }

    /// Collection path under the API server root.
    pub fn collection_path(self, namespace: &str) -> String {
        match self {
            ResourceKind::Deployment => {
                format!("/apis/apps/v1/namespaces/{namespace}/deployments")
            }
            ResourceKind::StatefulSet => {
                format!("/apis/apps/v1/namespaces/{namespace}/statefulsets")
            }
            ResourceKind::Service => format!("/api/v1/namespaces/{namespace}/services"),
        }
    }

    pub fn item_path(self, namespace: &str, name: &str) -> String {
        format!("{}/{name}", self.collection_path(namespace))
    }
}

/// A resource ready to be created.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Resource {
    Deployment(Deployment),
    StatefulSet(StatefulSet),
    Service(Service),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Deployment(_) => ResourceKind::Deployment,
            Resource::StatefulSet(_) => ResourceKind::StatefulSet,
            Resource::Service(_) => ResourceKind::Service,
        }
    }

    pub fn name(&self) -> &str {
        let metadata = match self {
            Resource::Deployment(d) => &d.metadata,
            Resource::StatefulSet(s) => &s.metadata,
            Resource::Service(s) => &s.metadata,
        };
        metadata.name.as_deref().unwrap_or_default()
    }
}

/// How dependents are reaped on delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PropagationPolicy {
    Foreground,
    Background,
    Orphan,
}

/// A resource to be removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteTarget {
    pub api_version: &'static str,
    pub kind: ResourceKind,
    pub name: String,
    pub namespace: String,
    pub propagation_policy: PropagationPolicy,
}

impl DeleteTarget {
    /// Delete with foreground cascading so dependent pods go first.
    pub fn foreground(kind: ResourceKind, name: impl Into<String>, namespace: &str) -> Self {
        Self {
            api_version: kind.api_version(),
            kind,
            name: name.into(),
            namespace: namespace.to_string(),
            propagation_policy: PropagationPolicy::Foreground,
        }
    }
}

// =============================================================================
// Object model
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ObjectMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    pub match_labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
    pub spec: DeploymentSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    pub replicas: u32,
    pub selector: LabelSelector,
    pub template: PodTemplateSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatefulSet {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
    pub spec: StatefulSetSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatefulSetSpec {
    pub replicas: u32,
    pub service_name: String,
    pub selector: LabelSelector,
    pub template: PodTemplateSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodTemplateSpec {
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodSpec {
    pub containers: Vec<ContainerSpec>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<PodVolume>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodVolume {
    pub name: String,
    pub persistent_volume_claim: ClaimRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRef {
    pub claim_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
    pub spec: ServiceSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSpec {
    #[serde(rename = "type")]
    pub type_: ServiceType,

    #[serde(rename = "clusterIP", skip_serializing_if = "Option::is_none")]
    pub cluster_ip: Option<String>,

    pub selector: BTreeMap<String, String>,
    pub ports: Vec<ServicePort>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceType {
    ClusterIP,
    LoadBalancer,
}

impl ServiceType {
    pub fn for_visibility(public: bool) -> Self {
        if public {
            ServiceType::LoadBalancer
        } else {
            ServiceType::ClusterIP
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServicePort {
    pub name: String,
    pub port: u16,
    pub protocol: &'static str,
}

// =============================================================================
// Translation
// =============================================================================

/// Name of the router workload fronting a shard set.
pub fn sharder_name(service: &str) -> String {
    format!("{service}-sharder")
}

fn app_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_string(), name.to_string())])
}

fn metadata(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: app_labels(name),
    }
}

fn pod_template(app: &str, containers: Vec<ContainerSpec>, volumes: Vec<PodVolume>) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: ObjectMeta {
            labels: app_labels(app),
            ..Default::default()
        },
        spec: PodSpec {
            containers,
            volumes,
        },
    }
}

/// One container per declared container, named `<service>-<index>`.
pub fn containers(service: &model::ServiceSpec) -> Vec<ContainerSpec> {
    service
        .containers
        .iter()
        .enumerate()
        .map(|(ix, c)| ContainerSpec {
            name: format!("{}-{ix}", service.name),
            image: c.image.clone(),
            env: c
                .env
                .iter()
                .map(|e| EnvVar {
                    name: e.name.clone(),
                    value: e.value.clone(),
                })
                .collect(),
            volume_mounts: c
                .volume_mounts
                .iter()
                .map(|m| VolumeMount {
                    name: m.name.clone(),
                    mount_path: m.mount_path.clone(),
                    sub_path: m.sub_path.clone(),
                })
                .collect(),
        })
        .collect()
}

fn volumes(service: &model::ServiceSpec) -> Vec<PodVolume> {
    service
        .volumes
        .iter()
        .map(|v| PodVolume {
            name: v.name.clone(),
            persistent_volume_claim: ClaimRef {
                claim_name: v.persistent_volume_claim.clone(),
            },
        })
        .collect()
}

/// Every declared port, over TCP.
pub fn service_ports(service: &model::ServiceSpec) -> Vec<ServicePort> {
    service
        .ports
        .iter()
        .map(|p| ServicePort {
            name: format!("tcp-{}", p.number),
            port: p.number,
            protocol: "TCP",
        })
        .collect()
}

/// Stateless replica set for a replicated service.
pub fn deployment(service: &model::ServiceSpec, namespace: &str) -> Deployment {
    Deployment {
        api_version: "apps/v1",
        kind: "Deployment",
        metadata: metadata(&service.name, namespace),
        spec: DeploymentSpec {
            replicas: service.replicas,
            selector: LabelSelector {
                match_labels: app_labels(&service.name),
            },
            template: pod_template(&service.name, containers(service), volumes(service)),
        },
    }
}

/// Service selecting a replicated service's pods.
pub fn load_balanced_service(service: &model::ServiceSpec, namespace: &str, public: bool) -> Service {
    Service {
        api_version: "v1",
        kind: "Service",
        metadata: metadata(&service.name, namespace),
        spec: ServiceSpec {
            type_: ServiceType::for_visibility(public),
            cluster_ip: None,
            selector: app_labels(&service.name),
            ports: service_ports(service),
        },
    }
}

/// Headless service giving each shard a stable DNS name.
pub fn headless_service(service: &model::ServiceSpec, namespace: &str) -> Service {
    Service {
        api_version: "v1",
        kind: "Service",
        metadata: metadata(&service.name, namespace),
        spec: ServiceSpec {
            type_: ServiceType::ClusterIP,
            cluster_ip: Some("None".to_string()),
            selector: app_labels(&service.name),
            ports: service_ports(service),
        },
    }
}

/// The shard set itself.
pub fn stateful_set(service: &model::ServiceSpec, namespace: &str, shards: u32) -> StatefulSet {
    StatefulSet {
        api_version: "apps/v1",
        kind: "StatefulSet",
        metadata: metadata(&service.name, namespace),
        spec: StatefulSetSpec {
            replicas: shards,
            service_name: service.name.clone(),
            selector: LabelSelector {
                match_labels: app_labels(&service.name),
            },
            template: pod_template(&service.name, containers(service), volumes(service)),
        },
    }
}

/// Comma-joined stable address of every shard, in shard order.
///
/// Only one port per shard is addressable.
pub fn shard_addresses(name: &str, shards: u32, port: u16) -> String {
    (0..shards)
        .map(|ix| format!("{SHARD_SCHEME}://{name}-{ix}.{name}:{port}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Environment for the router container.
pub fn router_env(service: &model::ServiceSpec, shards: u32, port: u16) -> Vec<EnvVar> {
    let mut env = vec![
        EnvVar {
            name: "SHARD_ADDRESSES".to_string(),
            value: shard_addresses(&service.name, shards, port),
        },
        EnvVar {
            name: "SERVER_ADDRESS".to_string(),
            value: format!("0.0.0.0:{port}"),
        },
    ];

    let pattern = service
        .shard_spec
        .as_ref()
        .and_then(|s| s.url_pattern.as_deref())
        .filter(|p| !p.is_empty());
    if let Some(pattern) = pattern {
        env.push(EnvVar {
            name: "PATH_REGEXP".to_string(),
            value: pattern.to_string(),
        });
    }
    env
}

/// Router deployment fronting the shard set.
pub fn router_deployment(
    service: &model::ServiceSpec,
    namespace: &str,
    image: &str,
    shards: u32,
    port: u16,
) -> Deployment {
    let name = sharder_name(&service.name);
    let container = ContainerSpec {
        name: "sharder".to_string(),
        image: image.to_string(),
        env: router_env(service, shards, port),
        volume_mounts: Vec::new(),
    };

    Deployment {
        api_version: "apps/v1",
        kind: "Deployment",
        metadata: metadata(&name, namespace),
        spec: DeploymentSpec {
            replicas: shards,
            selector: LabelSelector {
                match_labels: app_labels(&name),
            },
            template: pod_template(&name, vec![container], Vec::new()),
        },
    }
}

/// Entry point for a shard set: the router, not the headless service.
pub fn router_service(service: &model::ServiceSpec, namespace: &str, public: bool) -> Service {
    let name = sharder_name(&service.name);
    Service {
        api_version: "v1",
        kind: "Service",
        metadata: metadata(&name, namespace),
        spec: ServiceSpec {
            type_: ServiceType::for_visibility(public),
            cluster_ip: None,
            selector: app_labels(&name),
            ports: service_ports(service),
        },
    }
}
