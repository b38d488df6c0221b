//! Application state shared across request handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use topo_spec::ApplicationSpec;

/// Shared application state.
#[derive(Clone, Default)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

#[derive(Default)]
struct AppStateInner {
    specs: RwLock<BTreeMap<String, ApplicationSpec>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored specification, ordered by name.
    pub async fn list(&self) -> Vec<ApplicationSpec> {
        self.inner.specs.read().await.values().cloned().collect()
    }

    pub async fn get(&self, name: &str) -> Option<ApplicationSpec> {
        self.inner.specs.read().await.get(name).cloned()
    }

    /// Store `spec`, returning true when it replaced an existing entry.
    pub async fn put(&self, spec: ApplicationSpec) -> bool {
        self.inner
            .specs
            .write()
            .await
            .insert(spec.name.clone(), spec)
            .is_some()
    }

    /// Remove a specification, returning true when one existed.
    pub async fn remove(&self, name: &str) -> bool {
        self.inner.specs.write().await.remove(name).is_some()
    }
}
