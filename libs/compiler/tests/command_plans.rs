//! Plan execution for the CLI-driven backends.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use topo_compiler::aci::AciCompiler;
use topo_compiler::docker::DockerCompiler;
use topo_compiler::exec::{CommandOutput, CommandRunner, ExecError};
use topo_compiler::{CompileOptions, Compiler, Error, PlanMode};
use topo_spec::{ApplicationSpec, Container, Port, ServiceSpec, ShardSpec};

/// Records command lines and fails any whose last argument is `fail_on`.
#[derive(Default)]
struct FakeRunner {
    commands: Mutex<Vec<String>>,
    fail_on: Option<&'static str>,
    stream_code: Option<i32>,
}

impl FakeRunner {
    fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn output(&self, argv: &[String]) -> Result<CommandOutput, ExecError> {
        self.commands.lock().unwrap().push(argv.join(" "));
        let failed = argv.iter().any(|a| Some(a.as_str()) == self.fail_on);
        Ok(CommandOutput {
            code: Some(if failed { 125 } else { 0 }),
            stdout: Vec::new(),
            stderr: if failed { b"conflict\n".to_vec() } else { Vec::new() },
        })
    }

    async fn stream(
        &self,
        argv: &[String],
        out: &mut (dyn AsyncWrite + Send + Unpin),
        _err: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<Option<i32>, ExecError> {
        self.commands.lock().unwrap().push(argv.join(" "));
        out.write_all(b"log line\n").await?;
        Ok(self.stream_code)
    }
}

fn service(name: &str, port: u16) -> ServiceSpec {
    ServiceSpec {
        name: name.to_string(),
        containers: vec![Container::new(format!("acme/{name}:1"))],
        ports: vec![Port::tcp(port)],
        ..Default::default()
    }
}

fn app(services: Vec<ServiceSpec>) -> ApplicationSpec {
    ApplicationSpec {
        guid: 3,
        name: "local".to_string(),
        serve: None,
        services,
    }
}

#[tokio::test]
async fn docker_plan_runs_each_service_in_order() {
    let runner = Arc::new(FakeRunner::default());
    let compiler = DockerCompiler::with_runner(runner.clone());

    let plan = compiler
        .compile(&CompileOptions::default(), &app(vec![service("db", 5432), service("web", 80)]))
        .unwrap();
    assert_eq!(plan.mode(), PlanMode::Create);
    plan.execute(false).await.unwrap();

    assert_eq!(
        runner.commands(),
        [
            "docker run --name db -d -p 5432:5432 acme/db:1",
            "docker run --name web -d -p 80:80 acme/web:1",
        ]
    );
}

#[tokio::test]
async fn dry_run_executes_nothing() {
    let runner = Arc::new(FakeRunner::default());
    let compiler = DockerCompiler::with_runner(runner.clone());

    let plan = compiler
        .delete(&CompileOptions::default(), &app(vec![service("db", 5432)]))
        .unwrap();
    plan.execute(true).await.unwrap();

    assert!(runner.commands().is_empty());
}

#[tokio::test]
async fn failing_command_aborts_remaining_services() {
    let runner = Arc::new(FakeRunner {
        fail_on: Some("db"),
        ..Default::default()
    });
    let compiler = DockerCompiler::with_runner(runner.clone());

    let plan = compiler
        .compile(&CompileOptions::default(), &app(vec![service("db", 5432), service("web", 80)]))
        .unwrap();
    let err = plan.execute(false).await.unwrap_err();

    assert_eq!(err.to_string(), "docker exited with status 125: conflict");
    assert_eq!(runner.commands().len(), 1);
}

#[tokio::test]
async fn rejection_happens_before_any_command() {
    let runner = Arc::new(FakeRunner::default());
    let mut sharded = service("cache", 6379);
    sharded.shard_spec = Some(ShardSpec {
        shards: 3,
        ..Default::default()
    });
    let spec = app(vec![service("db", 5432), sharded]);

    let docker = DockerCompiler::with_runner(runner.clone());
    let aci = AciCompiler::with_runner(runner.clone(), "rg");
    for compiler in [&docker as &dyn Compiler, &aci] {
        let err = compiler.compile(&CompileOptions::default(), &spec).err().unwrap();
        assert_eq!(err.service(), Some("cache"));
    }
    assert!(runner.commands().is_empty());
}

#[tokio::test]
async fn command_plans_cannot_be_dumped() {
    let runner = Arc::new(FakeRunner::default());
    let dir = tempfile::tempdir().unwrap();

    let plan = AciCompiler::with_runner(runner, "rg")
        .compile(&CompileOptions::default(), &app(vec![service("web", 80)]))
        .unwrap();
    let err = plan.dump(dir.path()).unwrap_err();

    assert!(matches!(err, Error::DumpUnsupported { backend: "aci" }));
}

#[tokio::test]
async fn docker_logs_is_one_shot() {
    let runner = Arc::new(FakeRunner {
        stream_code: Some(0),
        ..Default::default()
    });
    let compiler = DockerCompiler::with_runner(runner.clone());

    compiler
        .logs(
            &app(vec![service("db", 5432), service("web", 80)]),
            Box::new(tokio::io::sink()),
            Box::new(tokio::io::sink()),
        )
        .await
        .unwrap();

    assert_eq!(runner.commands(), ["docker logs db"]);
}

#[tokio::test]
async fn docker_logs_surfaces_exit_code() {
    let runner = Arc::new(FakeRunner {
        stream_code: Some(1),
        ..Default::default()
    });
    let compiler = DockerCompiler::with_runner(runner);

    let err = compiler
        .logs(
            &app(vec![service("db", 5432)]),
            Box::new(tokio::io::sink()),
            Box::new(tokio::io::sink()),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Exec(ExecError::Failed { code: Some(1), .. })
    ));
}
