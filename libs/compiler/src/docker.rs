//! Local container runtime through the `docker` CLI.

use std::sync::Arc;

use async_trait::async_trait;
use topo_spec::{ApplicationSpec, ServiceSpec};

use crate::compiler::{CompileOptions, Compiler, LogSink, Plan, PlanMode};
use crate::error::{Error, Result};
use crate::exec::{
    env_args, single_container, CommandPlan, CommandRunner, ExecError, Invocation, ProcessRunner,
};

const BACKEND: &str = "docker";

/// Compiler for the local container runtime.
pub struct DockerCompiler {
    runner: Arc<dyn CommandRunner>,
}

impl Default for DockerCompiler {
    fn default() -> Self {
        Self::with_runner(Arc::new(ProcessRunner))
    }
}

impl DockerCompiler {
    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn plan(&self, mode: PlanMode, invocations: Vec<Invocation>) -> Box<dyn Plan> {
        Box::new(CommandPlan::new(BACKEND, mode, invocations, self.runner.clone()))
    }
}

/// `docker run` for one service. Every port is published on the same host port.
fn run_argv(service: &ServiceSpec) -> Result<Vec<String>> {
    let container = single_container(BACKEND, service)?;

    let mut argv = vec![
        "docker".to_string(),
        "run".to_string(),
        "--name".to_string(),
        service.name.clone(),
        "-d".to_string(),
    ];
    for port in &service.ports {
        argv.push("-p".to_string());
        argv.push(format!("{0}:{0}", port.number));
    }
    argv.extend(env_args(container));
    argv.push(container.image.clone());
    Ok(argv)
}

fn rm_argv(service: &ServiceSpec) -> Result<Vec<String>> {
    single_container(BACKEND, service)?;
    Ok(vec![
        "docker".to_string(),
        "rm".to_string(),
        "-f".to_string(),
        service.name.clone(),
    ])
}

fn invocations(
    spec: &ApplicationSpec,
    argv: fn(&ServiceSpec) -> Result<Vec<String>>,
) -> Result<Vec<Invocation>> {
    spec.services
        .iter()
        .map(|service| {
            Ok(Invocation {
                service: service.name.clone(),
                argv: argv(service)?,
            })
        })
        .collect()
}

#[async_trait]
impl Compiler for DockerCompiler {
    fn compile(&self, _options: &CompileOptions, spec: &ApplicationSpec) -> Result<Box<dyn Plan>> {
        Ok(self.plan(PlanMode::Create, invocations(spec, run_argv)?))
    }

    fn delete(&self, _options: &CompileOptions, spec: &ApplicationSpec) -> Result<Box<dyn Plan>> {
        Ok(self.plan(PlanMode::Delete, invocations(spec, rm_argv)?))
    }

    /// One-shot `docker logs`; the command ends with the container.
    async fn logs(&self, spec: &ApplicationSpec, mut out: LogSink, mut err: LogSink) -> Result<()> {
        let first = spec
            .services
            .first()
            .ok_or_else(|| Error::NoServices(spec.name.clone()))?;
        let argv = vec!["docker".to_string(), "logs".to_string(), first.name.clone()];

        match self.runner.stream(&argv, &mut *out, &mut *err).await? {
            Some(0) => Ok(()),
            code => Err(ExecError::Failed {
                program: "docker".to_string(),
                code,
                stderr: String::new(),
            }
            .into()),
        }
    }
}
