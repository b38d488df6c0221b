//! The deploy pipeline: load, register, compile, apply, attach.

use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use topo_compiler::aci::AciCompiler;
use topo_compiler::docker::DockerCompiler;
use topo_compiler::kubernetes::{KubeClient, KubeConfig, KubernetesCompiler};
use topo_compiler::{CompileOptions, Compiler, DEFAULT_NAMESPACE};
use topo_spec::{validate, ApplicationSpec};
use tracing::{debug, info};

use crate::client::RegistryClient;
use crate::config::{Config, Executor, Source};
use crate::error::CliError;

pub async fn run(config: Config) -> Result<()> {
    let registry = config
        .registry_url
        .as_deref()
        .map(RegistryClient::new)
        .transpose()?;

    let spec = match &config.source {
        Source::List => {
            let registry = registry.as_ref().ok_or(CliError::NoRegistry)?;
            return list(registry).await;
        }
        Source::File(path) => {
            let spec = ApplicationSpec::from_path(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            validate(&spec)?;
            if let Some(registry) = &registry {
                if !config.delete {
                    register(registry, &spec).await?;
                }
            }
            spec
        }
        Source::Registry(name) => {
            let registry = registry.as_ref().ok_or(CliError::NoRegistry)?;
            let spec = registry
                .get(name)
                .await?
                .ok_or_else(|| CliError::NotFound(name.clone()))?;
            validate(&spec)?;
            spec
        }
    };

    let (compiler, namespace) = build_compiler(&config)?;

    if config.deploy {
        let options = CompileOptions {
            working_dir: config.working_dir.clone(),
            ..CompileOptions::default().namespace(namespace)
        };

        let plan = if config.delete {
            compiler.delete(&options, &spec)?
        } else {
            compiler.compile(&options, &spec)?
        };

        match &config.dump {
            Some(dir) => {
                plan.dump(dir)?;
                eprintln!("{} Wrote plan to {}", "Success:".green().bold(), dir.display());
            }
            None => {
                plan.execute(config.dry_run).await?;
                if !config.dry_run {
                    let verb = if config.delete { "Deleted" } else { "Deployed" };
                    eprintln!("{} {verb} {}", "Success:".green().bold(), spec.name);
                }
            }
        }

        if config.delete && !config.dry_run && config.dump.is_none() {
            if let (Some(registry), Source::Registry(name)) = (&registry, &config.source) {
                registry.delete(name).await?;
                info!(%name, "unregistered specification");
            }
        }
    }

    if config.attach {
        compiler
            .logs(&spec, Box::new(tokio::io::stdout()), Box::new(tokio::io::stderr()))
            .await?;
    }

    Ok(())
}

/// Create or update the registry entry for `spec`.
async fn register(registry: &RegistryClient, spec: &ApplicationSpec) -> Result<(), CliError> {
    match registry.get(&spec.name).await? {
        None => info!(name = %spec.name, "registering specification"),
        Some(existing) if existing == *spec => {
            debug!(name = %spec.name, "specification unchanged");
            return Ok(());
        }
        Some(_) => info!(name = %spec.name, "updating specification"),
    }
    registry.put(spec).await?;
    Ok(())
}

async fn list(registry: &RegistryClient) -> Result<()> {
    let specs = registry.list().await?;
    if specs.is_empty() {
        println!("No specifications registered.");
        return Ok(());
    }
    for spec in specs {
        let services: Vec<&str> = spec.services.iter().map(|s| s.name.as_str()).collect();
        println!("{}\t{}", spec.name.bold(), services.join(","));
    }
    Ok(())
}

/// The selected backend plus the namespace plans should target.
fn build_compiler(config: &Config) -> Result<(Box<dyn Compiler>, String)> {
    let fallback = || config.namespace.clone().unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

    match config.executor {
        Executor::Kubernetes => {
            let path = config.kubeconfig.as_ref().ok_or(CliError::NoKubeconfig)?;
            let kube = KubeConfig::load(path)?;
            let namespace = config
                .namespace
                .clone()
                .or_else(|| kube.namespace.clone())
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
            debug!(server = %kube.server, %namespace, "using cluster");

            let client = KubeClient::from_config(&kube)?;
            let compiler = KubernetesCompiler::new(Arc::new(client))
                .with_namespace(namespace.clone())
                .with_log_filters(config.log_filters.clone());
            Ok((Box::new(compiler), namespace))
        }
        Executor::Aci => Ok((
            Box::new(AciCompiler::new(config.resource_group.clone())),
            fallback(),
        )),
        Executor::Docker => Ok((Box::new(DockerCompiler::default()), fallback())),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config(source: Source) -> Config {
        Config {
            source,
            executor: Executor::Docker,
            dry_run: true,
            delete: false,
            deploy: true,
            attach: false,
            registry_url: None,
            kubeconfig: None,
            namespace: None,
            resource_group: "topo".to_string(),
            working_dir: None,
            dump: None,
            log_filters: Vec::new(),
        }
    }

    fn write_spec(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("app.yaml");
        std::fs::write(
            &path,
            "name: store\nservices:\n  - name: web\n    containers:\n      - image: acme/web:1\n    ports:\n      - number: 80\n",
        )
        .unwrap();
        path
    }

    #[tokio::test]
    async fn dry_run_from_file_without_registry() {
        let dir = tempfile::tempdir().unwrap();
        run(config(Source::File(write_spec(dir.path())))).await.unwrap();
    }

    #[tokio::test]
    async fn file_is_registered_when_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/specs/store"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/specs/store"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "name": "store" })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = config(Source::File(write_spec(dir.path())));
        config.registry_url = Some(server.uri());
        config.deploy = false;
        run(config).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_registry_name_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/specs/ghost"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut config = config(Source::Registry("ghost".to_string()));
        config.registry_url = Some(server.uri());
        let err = run(config).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::NotFound(name)) if name == "ghost"
        ));
    }

    #[tokio::test]
    async fn registry_sources_need_a_registry() {
        let err = run(config(Source::List)).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::NoRegistry)));
    }

    #[tokio::test]
    async fn invalid_file_is_rejected_before_compiling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(
            &path,
            r#"{"name":"store","services":[{"name":"c","replicas":2,"shardSpec":{"shards":2},"containers":[{"image":"x"}]}]}"#,
        )
        .unwrap();

        let err = run(config(Source::File(path))).await.unwrap_err();
        assert!(err.to_string().contains("specification is invalid"));
    }

    #[tokio::test]
    async fn dump_is_unsupported_for_cli_backends() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(Source::File(write_spec(dir.path())));
        config.dump = Some(dir.path().join("out"));

        let err = run(config).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<topo_compiler::Error>(),
            Some(topo_compiler::Error::DumpUnsupported { backend: "docker" })
        ));
    }
}
