//! Managed container instances through the `az` CLI.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use topo_spec::{ApplicationSpec, ServiceSpec};
use tracing::{debug, warn};

use crate::compiler::{CompileOptions, Compiler, LogSink, Plan, PlanMode};
use crate::error::{Error, Result};
use crate::exec::{env_args, single_container, CommandPlan, CommandRunner, Invocation, ProcessRunner};

const BACKEND: &str = "aci";

/// Resource group used when none is configured.
pub const DEFAULT_RESOURCE_GROUP: &str = "topo";

/// Pause between `az container logs` runs.
pub const LOG_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Compiler for the container-instance service.
pub struct AciCompiler {
    runner: Arc<dyn CommandRunner>,
    resource_group: String,
}

impl AciCompiler {
    pub fn new(resource_group: impl Into<String>) -> Self {
        Self::with_runner(Arc::new(ProcessRunner), resource_group)
    }

    pub fn with_runner(runner: Arc<dyn CommandRunner>, resource_group: impl Into<String>) -> Self {
        Self {
            runner,
            resource_group: resource_group.into(),
        }
    }

    fn create_argv(&self, service: &ServiceSpec, public: bool) -> Result<Vec<String>> {
        let container = single_container(BACKEND, service)?;

        let mut argv: Vec<String> = ["az", "container", "create", "-g"]
            .into_iter()
            .map(String::from)
            .collect();
        argv.extend([
            self.resource_group.clone(),
            "-n".to_string(),
            service.name.clone(),
            "--image".to_string(),
            container.image.clone(),
        ]);

        match service.ports.as_slice() {
            [] => {}
            [port] => argv.extend(["--port".to_string(), port.number.to_string()]),
            _ => {
                return Err(Error::Unsupported {
                    backend: BACKEND,
                    service: service.name.clone(),
                    feature: "multiple ports",
                })
            }
        }

        argv.extend(env_args(container));

        if public {
            argv.extend(["--ip-address".to_string(), "public".to_string()]);
        }
        Ok(argv)
    }

    fn delete_argv(&self, service: &ServiceSpec) -> Result<Vec<String>> {
        single_container(BACKEND, service)?;
        Ok(vec![
            "az".to_string(),
            "container".to_string(),
            "delete".to_string(),
            "-g".to_string(),
            self.resource_group.clone(),
            "-n".to_string(),
            service.name.clone(),
            "--yes".to_string(),
        ])
    }
}

#[async_trait]
impl Compiler for AciCompiler {
    fn compile(&self, _options: &CompileOptions, spec: &ApplicationSpec) -> Result<Box<dyn Plan>> {
        let invocations = spec
            .services
            .iter()
            .map(|service| {
                Ok(Invocation {
                    service: service.name.clone(),
                    argv: self.create_argv(service, spec.is_public(service))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Box::new(CommandPlan::new(
            BACKEND,
            PlanMode::Create,
            invocations,
            self.runner.clone(),
        )))
    }

    fn delete(&self, _options: &CompileOptions, spec: &ApplicationSpec) -> Result<Box<dyn Plan>> {
        let invocations = spec
            .services
            .iter()
            .map(|service| {
                Ok(Invocation {
                    service: service.name.clone(),
                    argv: self.delete_argv(service)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Box::new(CommandPlan::new(
            BACKEND,
            PlanMode::Delete,
            invocations,
            self.runner.clone(),
        )))
    }

    /// Re-runs `az container logs` forever; the command does not stay
    /// attached. Only a failure to start it ends the loop.
    async fn logs(&self, spec: &ApplicationSpec, mut out: LogSink, mut err: LogSink) -> Result<()> {
        let first = spec
            .services
            .first()
            .ok_or_else(|| Error::NoServices(spec.name.clone()))?;
        let argv: Vec<String> = vec![
            "az".to_string(),
            "container".to_string(),
            "logs".to_string(),
            "-g".to_string(),
            self.resource_group.clone(),
            "-n".to_string(),
            first.name.clone(),
        ];

        loop {
            match self.runner.stream(&argv, &mut *out, &mut *err).await? {
                Some(0) => debug!(service = %first.name, "log command exited"),
                code => warn!(service = %first.name, ?code, "log command failed"),
            }
            tokio::time::sleep(LOG_RETRY_INTERVAL).await;
        }
    }
}
