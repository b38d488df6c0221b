//! Error handling and display for the CLI.

use colored::Colorize;
use thiserror::Error;
use topo_compiler::exec::ExecError;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Registry error: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Specification not found in registry: {0}")]
    NotFound(String),

    #[error("No registry configured")]
    NoRegistry,

    #[error("Could not locate a kubeconfig")]
    NoKubeconfig,
}

impl CliError {
    pub fn api(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            code: code.into(),
            message: message.into(),
        }
    }
}

fn hint(text: &str) {
    eprintln!("\n{}", format!("Hint: {text}").yellow());
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        match cli_err {
            CliError::NoRegistry => hint("Pass --registry-url or set TOPO_REGISTRY_URL."),
            CliError::NoKubeconfig => hint("Pass --kubeconfig or set KUBECONFIG."),
            CliError::Network(_) => hint("Check that the registry is running and reachable."),
            CliError::NotFound(_) => hint("Register it first with --file, or run with --list."),
            CliError::Api { status: 400, .. } => {
                hint("The registry rejected the specification; fix it and retry.")
            }
            _ => {}
        }
        return;
    }

    if let Some(compile_err) = err.downcast_ref::<topo_compiler::Error>() {
        match compile_err {
            topo_compiler::Error::Unsupported { .. } => {
                hint("Use --executor kubernetes for replicated, sharded or multi-port services.")
            }
            topo_compiler::Error::Cluster(_) => {
                hint("Check your kubeconfig context and cluster connectivity.")
            }
            topo_compiler::Error::Exec(ExecError::Spawn { program, .. }) => {
                hint(&format!("Make sure `{program}` is installed and on PATH."))
            }
            _ => {}
        }
    }
}
