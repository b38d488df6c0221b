//! Command-line arguments.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, ArgGroup, Parser};
use regex::Regex;

use crate::config::{default_kubeconfig_path, first_kubeconfig, Config, Executor, Source};

/// topoc - compile application specifications onto a deployment backend.
#[derive(Debug, Parser)]
#[command(name = "topoc")]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("source").required(true).args(["file", "name", "list"])))]
pub struct Cli {
    /// Specification file (JSON, or YAML for .yaml/.yml).
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Fetch the specification from the registry by name.
    #[arg(short, long)]
    name: Option<String>,

    /// List registered specifications and exit.
    #[arg(long)]
    list: bool,

    /// Only render the plan; make no changes.
    #[arg(long)]
    dry_run: bool,

    /// Tear the application down instead of creating it.
    #[arg(long)]
    delete: bool,

    /// Backend to deploy to.
    #[arg(long, value_enum, default_value_t = Executor::Kubernetes)]
    executor: Executor,

    /// Tail the first service's logs afterwards.
    #[arg(long)]
    attach: bool,

    /// Compile and apply the plan. `--deploy=false` skips it.
    #[arg(
        long,
        action = ArgAction::Set,
        default_value_t = true,
        num_args = 0..=1,
        default_missing_value = "true",
        require_equals = true
    )]
    deploy: bool,

    /// Registry base URL.
    #[arg(long, env = "TOPO_REGISTRY_URL")]
    registry_url: Option<String>,

    /// Kubeconfig path (defaults to ~/.kube/config).
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Target namespace (defaults to the kubeconfig context's, then `default`).
    #[arg(long, env = "TOPO_NAMESPACE")]
    namespace: Option<String>,

    /// Resource group for the aci executor.
    #[arg(long, env = "TOPO_RESOURCE_GROUP", default_value = topo_compiler::aci::DEFAULT_RESOURCE_GROUP)]
    resource_group: String,

    /// Directory receiving rendered artifacts (stdout when unset).
    #[arg(long, env = "TOPO_WORKING_DIR")]
    working_dir: Option<PathBuf>,

    /// Write the plan into this directory instead of executing it.
    #[arg(long, value_name = "DIR")]
    dump: Option<PathBuf>,

    /// Only tail workloads or containers matching this pattern. Repeatable.
    #[arg(long = "log-filter", value_name = "REGEX")]
    log_filters: Vec<String>,
}

impl Cli {
    pub fn into_config(self) -> Result<Config> {
        let source = match (self.file, self.name) {
            (Some(path), _) => Source::File(path),
            (None, Some(name)) => Source::Registry(name),
            (None, None) => Source::List,
        };

        let log_filters = self
            .log_filters
            .iter()
            .map(|pattern| {
                Regex::new(pattern).with_context(|| format!("Invalid --log-filter '{pattern}'"))
            })
            .collect::<Result<Vec<_>>>()?;

        let kubeconfig = match self.kubeconfig {
            Some(path) => first_kubeconfig(path.as_os_str()),
            None => default_kubeconfig_path(),
        };

        Ok(Config {
            source,
            executor: self.executor,
            dry_run: self.dry_run,
            delete: self.delete,
            deploy: self.deploy,
            attach: self.attach,
            registry_url: self.registry_url.filter(|url| !url.is_empty()),
            kubeconfig,
            namespace: self.namespace.filter(|ns| !ns.is_empty()),
            resource_group: self.resource_group,
            working_dir: self.working_dir,
            dump: self.dump,
            log_filters,
        })
    }
}
