//! Workload discovery for log tailing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::task::{self, AbortHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::client::{ClusterClient, ClusterError, PodInfo};
use crate::logs::{LogCallbacks, LogEvent};

/// How often [`PollingDiscovery`] lists pods.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Finds workload containers and feeds their output to [`LogCallbacks`].
#[async_trait]
pub trait WorkloadDiscovery: Send + Sync {
    /// Watch pods matching `selector` until cancelled.
    ///
    /// Per-container failures go to `on_error`. An error is returned only
    /// when the initial listing fails.
    async fn watch(
        &self,
        namespace: &str,
        selector: &str,
        callbacks: Arc<dyn LogCallbacks>,
    ) -> Result<(), ClusterError>;
}

/// Discovery by periodically listing pods.
///
/// Dropping the `watch` future aborts every follow stream it started.
pub struct PollingDiscovery {
    client: Arc<dyn ClusterClient>,
    interval: Duration,
}

impl PollingDiscovery {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self {
            client,
            interval: POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

type ContainerKey = (String, String);

fn running_containers(pods: &[PodInfo]) -> HashSet<ContainerKey> {
    pods.iter()
        .filter(|p| matches!(p.phase.as_deref(), None | Some("Running")))
        .flat_map(|p| p.containers.iter().map(|c| (p.name.clone(), c.clone())))
        .collect()
}

/// Containers currently being followed, keyed both ways so finished
/// tasks can be matched back to their container.
#[derive(Default)]
struct Followers {
    handles: HashMap<ContainerKey, AbortHandle>,
    keys: HashMap<task::Id, ContainerKey>,
    /// When a container's last stream ended, so a re-follow skips history.
    ended: HashMap<ContainerKey, Instant>,
}

impl Followers {
    fn contains(&self, key: &ContainerKey) -> bool {
        self.handles.contains_key(key)
    }

    fn insert(&mut self, key: ContainerKey, handle: AbortHandle) {
        self.keys.insert(handle.id(), key.clone());
        self.handles.insert(key, handle);
    }

    /// Forget the task `id`. Returns its container when it was still the
    /// live follower for it.
    fn finish(&mut self, id: task::Id) -> Option<ContainerKey> {
        let key = self.keys.remove(&id)?;
        match self.handles.get(&key) {
            Some(handle) if handle.id() == id => {
                self.handles.remove(&key);
                Some(key)
            }
            _ => None,
        }
    }
}

#[async_trait]
impl WorkloadDiscovery for PollingDiscovery {
    async fn watch(
        &self,
        namespace: &str,
        selector: &str,
        callbacks: Arc<dyn LogCallbacks>,
    ) -> Result<(), ClusterError> {
        let mut tasks = JoinSet::new();
        let mut followers = Followers::default();
        let mut skipped: HashSet<ContainerKey> = HashSet::new();

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut first = true;

        loop {
            ticker.tick().await;

            while let Some(done) = tasks.try_join_next_with_id() {
                let (id, ended) = match done {
                    Ok((id, ended)) => (id, Some(ended)),
                    Err(err) => (err.id(), None),
                };
                if let Some(key) = followers.finish(id) {
                    debug!(pod = %key.0, container = %key.1, "container log ended");
                    callbacks.on_exit(&key.0, &key.1);
                    followers.ended.insert(key, ended.unwrap_or_else(Instant::now));
                }
            }

            let pods = match self.client.list_pods(namespace, selector).await {
                Ok(pods) => pods,
                Err(err) if first => return Err(err),
                Err(err) => {
                    warn!(%selector, error = %err, "listing pods failed");
                    continue;
                }
            };
            first = false;

            let current = running_containers(&pods);

            followers.handles.retain(|key, handle| {
                if current.contains(key) {
                    return true;
                }
                handle.abort();
                callbacks.on_exit(&key.0, &key.1);
                false
            });
            followers.ended.retain(|key, _| current.contains(key));
            skipped.retain(|key| current.contains(key));

            for key in current {
                if followers.contains(&key) || skipped.contains(&key) {
                    continue;
                }
                if !callbacks.on_enter(&key.0, &key.1) {
                    skipped.insert(key);
                    continue;
                }

                let since = followers.ended.remove(&key).map(|at| at.elapsed());
                debug!(pod = %key.0, container = %key.1, ?since, "following container log");
                let handle = tasks.spawn(follow(
                    self.client.clone(),
                    callbacks.clone(),
                    namespace.to_string(),
                    key.clone(),
                    since,
                ));
                followers.insert(key, handle);
            }
        }
    }
}

/// Stream one container until its log ends. Returns when it ended.
async fn follow(
    client: Arc<dyn ClusterClient>,
    callbacks: Arc<dyn LogCallbacks>,
    namespace: String,
    (pod, container): ContainerKey,
    since: Option<Duration>,
) -> Instant {
    let mut lines = match client.stream_logs(&namespace, &pod, &container, since).await {
        Ok(lines) => lines,
        Err(err) => {
            callbacks.on_error(&pod, &container, &err);
            return Instant::now();
        }
    };

    while let Some(line) = lines.next().await {
        match line {
            Ok(message) => callbacks.on_event(LogEvent {
                workload: pod.clone(),
                container: container.clone(),
                message,
            }),
            Err(err) => {
                callbacks.on_error(&pod, &container, &err);
                break;
            }
        }
    }
    Instant::now()
}
