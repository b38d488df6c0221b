//! Orchestrator backend.
//!
//! Replicated services become a Deployment plus a Service. Sharded services
//! become a headless Service, a StatefulSet, and a router Deployment with its
//! own Service in front. Every rendered resource is persisted as an artifact
//! before the cluster is called.

mod client;
mod discovery;
mod kubeconfig;
pub mod resources;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use topo_spec::{validate_service, ApplicationSpec, ServiceSpec};
use tracing::info;

pub use client::{ClusterClient, ClusterError, KubeClient, LineStream, PodInfo};
pub use discovery::{PollingDiscovery, WorkloadDiscovery, POLL_INTERVAL};
pub use kubeconfig::KubeConfig;
pub use resources::{
    shard_addresses, DeleteTarget, PropagationPolicy, Resource, ResourceKind, SHARDER_IMAGE,
};

use crate::compiler::{CompileOptions, Compiler, LogSink, Plan, PlanMode, DEFAULT_NAMESPACE};
use crate::error::{Error, Result};
use crate::exec::{ensure_dir, ArtifactWriter};
use crate::logs::{LogCallbacks, LogTail};

/// Compiler targeting a cluster API server.
pub struct KubernetesCompiler {
    client: Arc<dyn ClusterClient>,
    discovery: Arc<dyn WorkloadDiscovery>,
    namespace: String,
    log_filters: Vec<Regex>,
}

impl KubernetesCompiler {
    /// Discovery defaults to polling through the same client.
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self {
            discovery: Arc::new(PollingDiscovery::new(client.clone())),
            client,
            namespace: DEFAULT_NAMESPACE.to_string(),
            log_filters: Vec::new(),
        }
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn WorkloadDiscovery>) -> Self {
        self.discovery = discovery;
        self
    }

    /// Namespace searched when tailing logs.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Only tail workloads or containers matching one of `filters`.
    pub fn with_log_filters(mut self, filters: Vec<Regex>) -> Self {
        self.log_filters = filters;
        self
    }

    fn plan(&self, options: &CompileOptions, mode: PlanMode, operations: Vec<Operation>) -> Box<dyn Plan> {
        Box::new(KubernetesPlan {
            mode,
            operations,
            artifacts: ArtifactWriter::from_options(options),
            client: self.client.clone(),
        })
    }
}

/// Reject every invalid service before anything is emitted.
fn check_services(spec: &ApplicationSpec) -> Result<()> {
    for service in &spec.services {
        validate_service(service)?;
        if service.is_sharded() && service.ports.is_empty() {
            return Err(Error::MissingShardPort(service.name.clone()));
        }
    }
    Ok(())
}

fn create_operations(
    service: &ServiceSpec,
    public: bool,
    options: &CompileOptions,
) -> Result<Vec<Operation>> {
    let name = &service.name;
    let ns = options.namespace.as_str();
    let create = |suffix: &str, resource: Resource| Operation::Create {
        artifact: format!("{name}-{suffix}"),
        namespace: ns.to_string(),
        resource,
    };

    let mut ops = Vec::new();
    if service.replicas > 0 {
        ops.push(create("deploy", Resource::Deployment(resources::deployment(service, ns))));
        ops.push(create(
            "load-balancer",
            Resource::Service(resources::load_balanced_service(service, ns, public)),
        ));
    }

    let shards = service.shard_spec.as_ref().map_or(0, |s| s.shards);
    if shards > 0 {
        let port = service
            .first_port()
            .ok_or_else(|| Error::MissingShardPort(name.clone()))?
            .number;

        ops.push(create(
            "shards-service",
            Resource::Service(resources::headless_service(service, ns)),
        ));
        ops.push(create(
            "stateful-set",
            Resource::StatefulSet(resources::stateful_set(service, ns, shards)),
        ));
        ops.push(create(
            "shard-router",
            Resource::Deployment(resources::router_deployment(
                service,
                ns,
                &options.router_image,
                shards,
                port,
            )),
        ));
        ops.push(create(
            "shard-router-service",
            Resource::Service(resources::router_service(service, ns, public)),
        ));
    }
    Ok(ops)
}

fn delete_operations(service: &ServiceSpec, namespace: &str) -> Vec<Operation> {
    let name = &service.name;
    let delete = |suffix: &str, kind: ResourceKind, target: String| Operation::Delete {
        artifact: format!("{name}-{suffix}-delete"),
        target: DeleteTarget::foreground(kind, target, namespace),
    };

    let mut ops = Vec::new();
    if service.replicas > 0 {
        ops.push(delete("deploy", ResourceKind::Deployment, name.clone()));
        ops.push(delete("load-balancer", ResourceKind::Service, name.clone()));
    }
    if service.is_sharded() {
        let router = resources::sharder_name(name);
        ops.push(delete("shard-router", ResourceKind::Deployment, router.clone()));
        ops.push(delete("stateful-set", ResourceKind::StatefulSet, name.clone()));
        ops.push(delete("shard-router-service", ResourceKind::Service, router));
        ops.push(delete("shards-service", ResourceKind::Service, name.clone()));
    }
    ops
}

#[async_trait]
impl Compiler for KubernetesCompiler {
    fn compile(&self, options: &CompileOptions, spec: &ApplicationSpec) -> Result<Box<dyn Plan>> {
        check_services(spec)?;

        let mut operations = Vec::new();
        for service in &spec.services {
            operations.extend(create_operations(service, spec.is_public(service), options)?);
        }
        Ok(self.plan(options, PlanMode::Create, operations))
    }

    fn delete(&self, options: &CompileOptions, spec: &ApplicationSpec) -> Result<Box<dyn Plan>> {
        check_services(spec)?;

        let operations = spec
            .services
            .iter()
            .flat_map(|service| delete_operations(service, &options.namespace))
            .collect();
        Ok(self.plan(options, PlanMode::Delete, operations))
    }

    async fn logs(&self, spec: &ApplicationSpec, mut out: LogSink, mut err: LogSink) -> Result<()> {
        let first = spec
            .services
            .first()
            .ok_or_else(|| Error::NoServices(spec.name.clone()))?;
        let selector = format!("{}={}", resources::APP_LABEL, first.name);

        let (tail, mut writer) = LogTail::new(self.log_filters.clone(), false);
        let callbacks: Arc<dyn LogCallbacks> = Arc::new(tail);
        info!(namespace = %self.namespace, %selector, "tailing logs");

        let watched = tokio::select! {
            watched = self.discovery.watch(&self.namespace, &selector, callbacks) => watched,
            written = writer.run(&mut *out, &mut *err) => return written.map_err(Error::Sink),
        };

        // Lines queued before discovery stopped still reach the sinks.
        writer.drain(&mut *out, &mut *err).await.map_err(Error::Sink)?;
        watched.map_err(Error::from)
    }
}

/// One step of a [`KubernetesPlan`].
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create {
        artifact: String,
        namespace: String,
        resource: Resource,
    },
    Delete {
        artifact: String,
        target: DeleteTarget,
    },
}

impl Operation {
    pub fn artifact(&self) -> &str {
        match self {
            Operation::Create { artifact, .. } | Operation::Delete { artifact, .. } => artifact,
        }
    }

    fn persist(&self, writer: &ArtifactWriter) -> Result<()> {
        match self {
            Operation::Create {
                artifact, resource, ..
            } => writer.write(artifact, resource),
            Operation::Delete { artifact, target } => writer.write(artifact, target),
        }
    }

    async fn apply(&self, client: &dyn ClusterClient) -> Result<()> {
        match self {
            Operation::Create {
                namespace, resource, ..
            } => client.create(namespace, resource).await?,
            Operation::Delete { target, .. } => client.delete(target).await?,
        }
        Ok(())
    }
}

/// Ordered cluster operations for one application.
pub struct KubernetesPlan {
    mode: PlanMode,
    operations: Vec<Operation>,
    artifacts: ArtifactWriter,
    client: Arc<dyn ClusterClient>,
}

impl KubernetesPlan {
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }
}

#[async_trait]
impl Plan for KubernetesPlan {
    fn mode(&self) -> PlanMode {
        self.mode
    }

    async fn execute(&self, dry_run: bool) -> Result<()> {
        for operation in &self.operations {
            operation.persist(&self.artifacts)?;
            if dry_run {
                info!(artifact = operation.artifact(), "dry run, skipping cluster call");
                continue;
            }
            info!(artifact = operation.artifact(), "applying");
            operation.apply(self.client.as_ref()).await?;
        }
        Ok(())
    }

    fn dump(&self, dir: &Path) -> Result<()> {
        ensure_dir(dir)?;
        let writer = ArtifactWriter::Directory(dir.to_path_buf());
        for operation in &self.operations {
            operation.persist(&writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topo_spec::{Container, Port, ShardSpec};

    fn artifacts(ops: &[Operation]) -> Vec<&str> {
        ops.iter().map(Operation::artifact).collect()
    }

    fn replicated(name: &str) -> ServiceSpec {
        ServiceSpec {
            name: name.to_string(),
            containers: vec![Container::new("acme/web:1")],
            ports: vec![Port::tcp(80)],
            replicas: 2,
            ..Default::default()
        }
    }

    fn sharded(name: &str, shards: u32) -> ServiceSpec {
        ServiceSpec {
            name: name.to_string(),
            containers: vec![Container::new("acme/cache:1")],
            ports: vec![Port::tcp(6379)],
            shard_spec: Some(ShardSpec {
                shards,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn replicated_service_emits_deployment_then_service() {
        let ops = create_operations(&replicated("web"), false, &CompileOptions::default()).unwrap();
        assert_eq!(artifacts(&ops), ["web-deploy", "web-load-balancer"]);
    }

    #[test]
    fn sharded_service_emits_four_resources_in_order() {
        let ops = create_operations(&sharded("cache", 3), false, &CompileOptions::default()).unwrap();
        assert_eq!(
            artifacts(&ops),
            [
                "cache-shards-service",
                "cache-stateful-set",
                "cache-shard-router",
                "cache-shard-router-service"
            ]
        );
    }

    #[test]
    fn zero_shards_emit_nothing() {
        let ops = create_operations(&sharded("cache", 0), false, &CompileOptions::default()).unwrap();
        assert!(ops.is_empty());
    }

    #[test]
    fn sharded_delete_mirrors_creation() {
        let ops = delete_operations(&sharded("cache", 3), "default");
        assert_eq!(
            artifacts(&ops),
            [
                "cache-shard-router-delete",
                "cache-stateful-set-delete",
                "cache-shard-router-service-delete",
                "cache-shards-service-delete"
            ]
        );
        assert!(ops.iter().all(|op| matches!(
            op,
            Operation::Delete { target, .. } if target.propagation_policy == PropagationPolicy::Foreground
        )));
    }

    #[test]
    fn namespace_reaches_every_operation() {
        let options = CompileOptions::default().namespace("staging");
        let ops = create_operations(&replicated("web"), true, &options).unwrap();
        assert!(ops.iter().all(|op| matches!(
            op,
            Operation::Create { namespace, .. } if namespace == "staging"
        )));
    }
}
