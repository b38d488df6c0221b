//! Resolved runtime configuration.
//!
//! Built once from the command line (with environment fallbacks) and passed
//! down to everything else.

use std::path::PathBuf;

use directories::BaseDirs;
use regex::Regex;

/// Where the specification comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    Registry(String),
    /// Only list what the registry holds.
    List,
}

/// Deployment backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Executor {
    Kubernetes,
    Aci,
    Docker,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub source: Source,
    pub executor: Executor,
    pub dry_run: bool,
    pub delete: bool,
    pub deploy: bool,
    pub attach: bool,
    pub registry_url: Option<String>,
    pub kubeconfig: Option<PathBuf>,
    /// Explicit namespace; otherwise the kubeconfig context decides.
    pub namespace: Option<String>,
    pub resource_group: String,
    pub working_dir: Option<PathBuf>,
    pub dump: Option<PathBuf>,
    pub log_filters: Vec<Regex>,
}

/// `<home>/.kube/config`, if a home directory can be determined.
pub fn default_kubeconfig_path() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().join(".kube").join("config"))
}

/// First entry of a `KUBECONFIG`-style path list.
pub fn first_kubeconfig(value: &std::ffi::OsStr) -> Option<PathBuf> {
    std::env::split_paths(value).find(|p| !p.as_os_str().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kubeconfig_lists_use_the_first_entry() {
        let joined = std::env::join_paths(["/tmp/a.yaml", "/tmp/b.yaml"]).unwrap();
        assert_eq!(first_kubeconfig(&joined), Some(PathBuf::from("/tmp/a.yaml")));
        assert_eq!(first_kubeconfig(std::ffi::OsStr::new("")), None);
    }

    #[test]
    fn default_kubeconfig_is_under_home() {
        if let Some(path) = default_kubeconfig_path() {
            assert!(path.ends_with(".kube/config"));
        }
    }
}
