//! In-memory `GukuApi` used by tests and local runs
//!
//! Binding statuses follow a script: the submit consumes the first entry,
//! each fetch the next, and the last entry repeats once the script runs
//! out. Every call is counted by operation name.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use super::{
    ApiError, Cluster, ClusterUpdate, GukuApi, NewCluster, NewPlatformBinding, Platform,
    PlatformBinding, PlatformBindingStatus, PlatformBindingUpdate,
};

#[derive(Default)]
pub struct InMemoryApi {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    clusters: BTreeMap<String, StoredCluster>,
    bindings: BTreeMap<(String, String), PlatformBinding>,
    platforms: Vec<Platform>,
    status_script: VecDeque<PlatformBindingStatus>,
    calls: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, String>,
    last_cluster_update: Option<ClusterUpdate>,
}

#[derive(Clone)]
struct StoredCluster {
    cluster: Cluster,
    token: String,
}

impl State {
    fn record(&mut self, op: &'static str) -> Result<(), ApiError> {
        *self.calls.entry(op).or_default() += 1;
        match self.failures.get(op) {
            Some(message) => Err(ApiError::Api {
                status: 500,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn next_status(&mut self) -> PlatformBindingStatus {
        if self.status_script.len() > 1 {
            self.status_script
                .pop_front()
                .unwrap_or(PlatformBindingStatus::Succeeded)
        } else {
            self.status_script
                .front()
                .copied()
                .unwrap_or(PlatformBindingStatus::Succeeded)
        }
    }
}

impl InMemoryApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replaces the binding status script
    pub fn script_binding_statuses(&self, statuses: impl IntoIterator<Item = PlatformBindingStatus>) {
        self.lock().status_script = statuses.into_iter().collect();
    }

    pub fn add_platform(&self, platform: Platform) {
        self.lock().platforms.push(platform);
    }

    /// Makes every subsequent `op` call fail with an HTTP 500 carrying `message`
    pub fn fail(&self, op: &'static str, message: &str) {
        self.lock().failures.insert(op, message.to_string());
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Number of calls made to `op`, e.g. "get_platform_binding"
    pub fn calls(&self, op: &str) -> usize {
        self.lock().calls.get(op).copied().unwrap_or(0)
    }

    pub fn cluster(&self, cluster_id: &str) -> Option<Cluster> {
        self.lock()
            .clusters
            .get(cluster_id)
            .map(|stored| stored.cluster.clone())
    }

    pub fn cluster_token(&self, cluster_id: &str) -> Option<String> {
        self.lock()
            .clusters
            .get(cluster_id)
            .map(|stored| stored.token.clone())
    }

    pub fn binding(&self, cluster_id: &str, binding_id: &str) -> Option<PlatformBinding> {
        self.lock()
            .bindings
            .get(&(cluster_id.to_string(), binding_id.to_string()))
            .cloned()
    }

    pub fn last_cluster_update(&self) -> Option<ClusterUpdate> {
        self.lock().last_cluster_update.clone()
    }

    /// Simulates an out-of-band change to a stored cluster
    pub fn edit_cluster(&self, cluster_id: &str, edit: impl FnOnce(&mut Cluster)) {
        if let Some(stored) = self.lock().clusters.get_mut(cluster_id) {
            edit(&mut stored.cluster);
        }
    }

    /// Simulates an out-of-band delete
    pub fn remove_cluster(&self, cluster_id: &str) {
        self.lock().clusters.remove(cluster_id);
    }

    pub fn remove_binding(&self, cluster_id: &str, binding_id: &str) {
        self.lock()
            .bindings
            .remove(&(cluster_id.to_string(), binding_id.to_string()));
    }
}

#[async_trait]
impl GukuApi for InMemoryApi {
    async fn create_cluster(&self, cluster: &NewCluster) -> Result<Cluster, ApiError> {
        let mut state = self.lock();
        state.record("create_cluster")?;

        let id = state.next_id("C");
        let created = Cluster {
            id: id.clone(),
            name: cluster.name.clone(),
            api_version: cluster.api_version.clone(),
            ca: cluster.ca.clone(),
            server: cluster.server.clone(),
            context: cluster.context.clone(),
        };
        state.clusters.insert(
            id,
            StoredCluster {
                cluster: created.clone(),
                token: cluster.token.clone(),
            },
        );
        Ok(created)
    }

    async fn get_cluster(&self, cluster_id: &str) -> Result<Cluster, ApiError> {
        let mut state = self.lock();
        state.record("get_cluster")?;
        state
            .clusters
            .get(cluster_id)
            .map(|stored| stored.cluster.clone())
            .ok_or_else(|| ApiError::NotFound(format!("cluster {}", cluster_id)))
    }

    async fn update_cluster(
        &self,
        cluster_id: &str,
        update: &ClusterUpdate,
    ) -> Result<(), ApiError> {
        let mut state = self.lock();
        state.record("update_cluster")?;
        state.last_cluster_update = Some(update.clone());

        let stored = state
            .clusters
            .get_mut(cluster_id)
            .ok_or_else(|| ApiError::NotFound(format!("cluster {}", cluster_id)))?;

        if let Some(name) = &update.name {
            stored.cluster.name = name.clone();
        }
        if let Some(api_version) = &update.api_version {
            stored.cluster.api_version = api_version.clone();
        }
        if let Some(token) = &update.token {
            stored.token = token.clone();
        }
        // Optional fields are cleared when unset
        stored.cluster.ca = update.ca.clone();
        stored.cluster.server = update.server.clone();
        stored.cluster.context = update.context.clone();
        Ok(())
    }

    async fn delete_cluster(&self, cluster_id: &str) -> Result<(), ApiError> {
        let mut state = self.lock();
        state.record("delete_cluster")?;
        state
            .clusters
            .remove(cluster_id)
            .map(|_| ())
            .ok_or_else(|| ApiError::NotFound(format!("cluster {}", cluster_id)))
    }

    async fn create_platform_binding(
        &self,
        binding: &NewPlatformBinding,
    ) -> Result<PlatformBinding, ApiError> {
        let mut state = self.lock();
        state.record("create_platform_binding")?;

        let id = state.next_id("PB");
        let status = state.next_status();
        let created = PlatformBinding {
            id: id.clone(),
            cluster_id: binding.cluster_id.clone(),
            platform_id: binding.platform_id.clone(),
            platform_version: binding.platform_version.clone(),
            platform_config_id: binding.platform_config_id.clone(),
            status,
        };
        state
            .bindings
            .insert((binding.cluster_id.clone(), id), created.clone());
        Ok(created)
    }

    async fn get_platform_binding(
        &self,
        cluster_id: &str,
        binding_id: &str,
    ) -> Result<PlatformBinding, ApiError> {
        let mut state = self.lock();
        state.record("get_platform_binding")?;

        let key = (cluster_id.to_string(), binding_id.to_string());
        if !state.bindings.contains_key(&key) {
            return Err(ApiError::NotFound(format!(
                "platform binding {} on cluster {}",
                binding_id, cluster_id
            )));
        }
        let status = state.next_status();
        let binding = state
            .bindings
            .get_mut(&key)
            .ok_or_else(|| ApiError::NotFound(binding_id.to_string()))?;
        binding.status = status;
        Ok(binding.clone())
    }

    async fn update_platform_binding(
        &self,
        cluster_id: &str,
        binding_id: &str,
        update: &PlatformBindingUpdate,
    ) -> Result<PlatformBinding, ApiError> {
        let mut state = self.lock();
        state.record("update_platform_binding")?;

        let key = (cluster_id.to_string(), binding_id.to_string());
        if !state.bindings.contains_key(&key) {
            return Err(ApiError::NotFound(format!(
                "platform binding {} on cluster {}",
                binding_id, cluster_id
            )));
        }
        let status = state.next_status();
        let binding = state
            .bindings
            .get_mut(&key)
            .ok_or_else(|| ApiError::NotFound(binding_id.to_string()))?;
        if let Some(config_id) = &update.platform_config_id {
            binding.platform_config_id = config_id.clone();
        }
        if let Some(version) = &update.platform_version {
            binding.platform_version = version.clone();
        }
        binding.status = status;
        Ok(binding.clone())
    }

    async fn delete_platform_binding(
        &self,
        cluster_id: &str,
        binding_id: &str,
    ) -> Result<(), ApiError> {
        let mut state = self.lock();
        state.record("delete_platform_binding")?;
        state
            .bindings
            .remove(&(cluster_id.to_string(), binding_id.to_string()))
            .map(|_| ())
            .ok_or_else(|| {
                ApiError::NotFound(format!(
                    "platform binding {} on cluster {}",
                    binding_id, cluster_id
                ))
            })
    }

    async fn get_platform(
        &self,
        platform_id: &str,
        platform_version: &str,
    ) -> Result<Option<Platform>, ApiError> {
        let mut state = self.lock();
        state.record("get_platform")?;
        Ok(state
            .platforms
            .iter()
            .find(|p| p.platform_id == platform_id && p.platform_version == platform_version)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PlatformBindingStatus::*;

    fn new_binding() -> NewPlatformBinding {
        NewPlatformBinding {
            cluster_id: "C-1".to_string(),
            platform_id: "P-1".to_string(),
            platform_version: "1.0.0".to_string(),
            platform_config_id: "PC-1".to_string(),
        }
    }

    #[tokio::test]
    async fn status_script_is_consumed_then_sticks() {
        let api = InMemoryApi::new();
        api.script_binding_statuses([Pending, Pending, Failed]);

        let created = api.create_platform_binding(&new_binding()).await.unwrap();
        assert_eq!(created.status, Pending);

        let id = created.id;
        let first = api.get_platform_binding("C-1", &id).await.unwrap();
        let second = api.get_platform_binding("C-1", &id).await.unwrap();
        let third = api.get_platform_binding("C-1", &id).await.unwrap();

        assert_eq!(first.status, Pending);
        assert_eq!(second.status, Failed);
        assert_eq!(third.status, Failed);
        assert_eq!(api.calls("get_platform_binding"), 3);
    }

    #[tokio::test]
    async fn unscripted_bindings_succeed_immediately() {
        let api = InMemoryApi::new();
        let created = api.create_platform_binding(&new_binding()).await.unwrap();
        assert_eq!(created.status, Succeeded);
    }

    #[tokio::test]
    async fn injected_failures_are_counted() {
        let api = InMemoryApi::new();
        api.fail("get_cluster", "boom");

        let result = api.get_cluster("C-1").await;

        assert!(matches!(result, Err(ApiError::Api { status: 500, .. })));
        assert_eq!(api.calls("get_cluster"), 1);
    }
}
