//! Execution harness shared by the backends.
//!
//! - Artifact persistence: rendered resources go to the working directory or
//!   stdout, whether or not the run is a dry run
//! - Process invocation for the CLI-driven backends, behind [`CommandRunner`]
//! - [`CommandPlan`], the plan type of every CLI-driven backend

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncWrite;
use tokio::process::Command;
use topo_spec::{Container, ServiceSpec};
use tracing::{debug, info};

use crate::compiler::{CompileOptions, Plan, PlanMode};
use crate::error::{Error, Result};

// =============================================================================
// Artifacts
// =============================================================================

/// Where rendered artifacts are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactWriter {
    /// One `<artifact>.json` file per resource.
    Directory(PathBuf),
    /// Concatenated on standard output.
    Stdout,
}

impl ArtifactWriter {
    pub fn from_options(options: &CompileOptions) -> Self {
        match &options.working_dir {
            Some(dir) => Self::Directory(dir.clone()),
            None => Self::Stdout,
        }
    }

    /// Render `value` as pretty JSON and persist it under `artifact`.
    pub fn write<T: Serialize>(&self, artifact: &str, value: &T) -> Result<()> {
        let bytes = render(artifact, value)?;
        match self {
            Self::Directory(dir) => write_file(&dir.join(format!("{artifact}.json")), &bytes),
            Self::Stdout => write_stdout(&mut std::io::stdout().lock(), &bytes),
        }
    }
}

/// Copy `bytes` to standard output, reported as the `<stdout>` path.
fn write_stdout(stdout: &mut impl Write, bytes: &[u8]) -> Result<()> {
    stdout
        .write_all(bytes)
        .and_then(|_| stdout.flush())
        .map_err(|source| Error::Write {
            path: PathBuf::from("<stdout>"),
            source,
        })
}

/// Pretty JSON with a trailing newline.
pub fn render<T: Serialize>(artifact: &str, value: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(value).map_err(|source| Error::Render {
        artifact: artifact.to_string(),
        source,
    })?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    debug!(path = %path.display(), "writing artifact");
    std::fs::write(path, bytes).map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Create `dir` (and parents) for a dump.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|source| Error::Write {
        path: dir.to_path_buf(),
        source,
    })
}

// =============================================================================
// Process invocation
// =============================================================================

/// Errors from running backend commands.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("empty command line")]
    Empty,

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {}: {stderr}", describe_code(.code))]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("i/o error while running command: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external programs on behalf of the CLI-driven backends.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion and capture both output streams.
    async fn output(&self, argv: &[String]) -> std::result::Result<CommandOutput, ExecError>;

    /// Run to completion, copying output into the sinks as it arrives.
    /// Returns the exit code (`None` when killed by a signal).
    async fn stream(
        &self,
        argv: &[String],
        out: &mut (dyn AsyncWrite + Send + Unpin),
        err: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> std::result::Result<Option<i32>, ExecError>;
}

/// [`CommandRunner`] backed by real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

fn command(argv: &[String]) -> std::result::Result<(String, Command), ExecError> {
    let (program, args) = argv.split_first().ok_or(ExecError::Empty)?;
    let mut cmd = Command::new(program);
    cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);
    Ok((program.clone(), cmd))
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn output(&self, argv: &[String]) -> std::result::Result<CommandOutput, ExecError> {
        let (program, mut cmd) = command(argv)?;
        let output = cmd
            .output()
            .await
            .map_err(|source| ExecError::Spawn { program, source })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    async fn stream(
        &self,
        argv: &[String],
        out: &mut (dyn AsyncWrite + Send + Unpin),
        err: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> std::result::Result<Option<i32>, ExecError> {
        let (program, mut cmd) = command(argv)?;
        let mut child = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecError::Spawn { program, source })?;

        let (mut child_out, mut child_err) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                return Err(ExecError::Io(std::io::Error::other(
                    "child output pipes unavailable",
                )))
            }
        };

        let (copied_out, copied_err) = tokio::join!(
            tokio::io::copy(&mut child_out, out),
            tokio::io::copy(&mut child_err, err),
        );
        copied_out?;
        copied_err?;

        let status = child.wait().await?;
        Ok(status.code())
    }
}

/// Run one command, or only print it when `dry_run` is set.
pub async fn execute_command(
    runner: &dyn CommandRunner,
    argv: &[String],
    dry_run: bool,
) -> Result<()> {
    let line = argv.join(" ");
    if dry_run {
        info!(command = %line, "dry run, not executing");
        println!("Would execute: {line}");
        return Ok(());
    }

    info!(command = %line, "executing");
    let output = runner.output(argv).await?;
    write_stdout(&mut std::io::stdout().lock(), &output.stdout)?;

    if !output.success() {
        return Err(ExecError::Failed {
            program: argv.first().cloned().unwrap_or_default(),
            code: output.code,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into());
    }
    Ok(())
}

/// The subset CLI-driven backends can express: one container, at most one
/// replica, no sharding.
pub(crate) fn single_container<'a>(
    backend: &'static str,
    service: &'a ServiceSpec,
) -> Result<&'a Container> {
    if service.replicas > 1 || service.shard_spec.is_some() {
        return Err(Error::Unsupported {
            backend,
            service: service.name.clone(),
            feature: "replication or sharding",
        });
    }
    match service.containers.as_slice() {
        [] => Err(Error::NoContainers(service.name.clone())),
        [container] => Ok(container),
        _ => Err(Error::Unsupported {
            backend,
            service: service.name.clone(),
            feature: "multiple containers",
        }),
    }
}

/// `-e NAME=VALUE` for every variable, in declaration order.
pub(crate) fn env_args(container: &Container) -> impl Iterator<Item = String> + '_ {
    container
        .env
        .iter()
        .flat_map(|e| ["-e".to_string(), format!("{}={}", e.name, e.value)])
}

// =============================================================================
// Command plans
// =============================================================================

/// One command line belonging to one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub service: String,
    pub argv: Vec<String>,
}

/// Plan for a CLI-driven backend: an ordered list of command lines.
pub struct CommandPlan {
    backend: &'static str,
    mode: PlanMode,
    invocations: Vec<Invocation>,
    runner: Arc<dyn CommandRunner>,
}

impl CommandPlan {
    pub fn new(
        backend: &'static str,
        mode: PlanMode,
        invocations: Vec<Invocation>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            backend,
            mode,
            invocations,
            runner,
        }
    }

    pub fn invocations(&self) -> &[Invocation] {
        &self.invocations
    }
}

#[async_trait]
impl Plan for CommandPlan {
    fn mode(&self) -> PlanMode {
        self.mode
    }

    async fn execute(&self, dry_run: bool) -> Result<()> {
        for invocation in &self.invocations {
            debug!(backend = self.backend, service = %invocation.service, "applying service");
            execute_command(self.runner.as_ref(), &invocation.argv, dry_run).await?;
        }
        Ok(())
    }

    fn dump(&self, _dir: &Path) -> Result<()> {
        Err(Error::DumpUnsupported {
            backend: self.backend,
        })
    }
}
