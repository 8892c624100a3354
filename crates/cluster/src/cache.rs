//! Caches and the per-node cache registry.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use corelib::{Node, NodeId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::error::{ClusterError, Result};
use crate::store::PersistenceManager;
use crate::topology::{MembershipView, RebalancePolicy, TopologyCoordinator};

/// Lifecycle state of a cache on this node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentStatus {
    Instantiated,
    Running,
    Stopping,
    Terminated,
    Failed,
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ComponentStatus::Instantiated => "instantiated",
            ComponentStatus::Running => "running",
            ComponentStatus::Stopping => "stopping",
            ComponentStatus::Terminated => "terminated",
            ComponentStatus::Failed => "failed",
        })
    }
}

/// Hook exposing a cache to an external management surface.
pub trait ManagementRegistration: Send + Sync {
    fn register(&self, cache: &str) -> Result<()>;
    fn unregister(&self, cache: &str) -> Result<()>;
}

/// One named cache on this node.
///
/// Entries live in an in-memory data container; with a persistence layer
/// configured, writes also go through to its primary store.
pub struct Cache {
    name: String,
    config: CacheConfig,
    local: NodeId,
    status: Mutex<ComponentStatus>,
    data: DashMap<Bytes, Bytes>,
    coordinator: Arc<TopologyCoordinator>,
    persistence: Option<Arc<PersistenceManager>>,
    management: Option<Arc<dyn ManagementRegistration>>,
}

impl Cache {
    pub fn new(
        name: impl Into<String>,
        config: CacheConfig,
        local: NodeId,
        coordinator: Arc<TopologyCoordinator>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            local,
            status: Mutex::new(ComponentStatus::Instantiated),
            data: DashMap::new(),
            coordinator,
            persistence: None,
            management: None,
        }
    }

    pub fn with_persistence(mut self, persistence: Arc<PersistenceManager>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn with_management(mut self, management: Arc<dyn ManagementRegistration>) -> Self {
        self.management = Some(management);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn status(&self) -> ComponentStatus {
        *self.status.lock()
    }

    pub fn coordinator(&self) -> &Arc<TopologyCoordinator> {
        &self.coordinator
    }

    pub fn persistence(&self) -> Option<&Arc<PersistenceManager>> {
        self.persistence.as_ref()
    }

    pub fn management(&self) -> Option<&Arc<dyn ManagementRegistration>> {
        self.management.as_ref()
    }

    pub fn start(&self) -> Result<()> {
        let mut status = self.status.lock();
        match *status {
            ComponentStatus::Running => return Ok(()),
            ComponentStatus::Stopping | ComponentStatus::Failed => {
                return Err(ClusterError::StartFailed {
                    cache: self.name.clone(),
                    reason: format!("cache is {}", *status),
                });
            }
            ComponentStatus::Instantiated | ComponentStatus::Terminated => {}
        }

        if let Some(persistence) = &self.persistence {
            if persistence.options().purge_on_startup {
                if let Err(e) = persistence.clear_all_stores() {
                    *status = ComponentStatus::Failed;
                    return Err(e.into());
                }
            }
        }
        if let Some(management) = &self.management {
            management.register(&self.name)?;
        }
        *status = ComponentStatus::Running;
        info!(cache = %self.name, "started cache");
        Ok(())
    }

    /// Stops local processing and drops the in-memory entries.
    ///
    /// Fails while another stop is in progress or after a failure; stopping
    /// a terminated cache is a no-op.
    pub fn stop(&self) -> Result<()> {
        {
            let mut status = self.status.lock();
            match *status {
                ComponentStatus::Stopping | ComponentStatus::Failed => {
                    return Err(ClusterError::StopFailed {
                        cache: self.name.clone(),
                        reason: format!("cache is {}", *status),
                    });
                }
                ComponentStatus::Terminated => return Ok(()),
                ComponentStatus::Instantiated | ComponentStatus::Running => {
                    *status = ComponentStatus::Stopping;
                }
            }
        }

        let entries = self.data.len();
        self.data.clear();
        *self.status.lock() = ComponentStatus::Terminated;
        info!(cache = %self.name, entries, "stopped cache");
        Ok(())
    }

    /// Marks the cache as failed; it can no longer be started or stopped.
    pub fn fail(&self) {
        *self.status.lock() = ComponentStatus::Failed;
    }

    /// Whether this node owns the segment of `key` for writing.
    pub fn is_local(&self, key: &[u8]) -> bool {
        self.coordinator
            .holder()
            .write_ch()
            .is_key_local_to(&self.local, key)
    }

    pub fn put(&self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Result<Option<Bytes>> {
        self.check_running()?;
        let (key, value) = (key.into(), value.into());
        if let Some(store) = self.persistence.as_ref().and_then(|p| p.primary()) {
            store.put(key.clone(), value.clone(), None)?;
        }
        Ok(self.data.insert(key, value))
    }

    /// Reads from the data container, loading from the store on a miss.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.check_running()?;
        if let Some(value) = self.data.get(key) {
            return Ok(Some(value.clone()));
        }
        let Some(store) = self.persistence.as_ref().and_then(|p| p.primary()) else {
            return Ok(None);
        };
        let loaded = store.get(key)?;
        if let Some(value) = &loaded {
            self.data.insert(Bytes::copy_from_slice(key), value.clone());
        }
        Ok(loaded)
    }

    pub fn remove(&self, key: &[u8]) -> Result<bool> {
        self.check_running()?;
        let mut removed = self.data.remove(key).is_some();
        if let Some(store) = self.persistence.as_ref().and_then(|p| p.primary()) {
            removed |= store.remove(key)?;
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn check_running(&self) -> Result<()> {
        match self.status() {
            ComponentStatus::Running => Ok(()),
            _ => Err(ClusterError::NotRunning(self.name.clone())),
        }
    }
}

/// Registry of the caches defined on this node.
pub struct CacheManager {
    local: Node,
    policy: RebalancePolicy,
    caches: DashMap<String, Arc<Cache>>,
    management: Option<Arc<dyn ManagementRegistration>>,
}

impl CacheManager {
    pub fn new(local: Node) -> Self {
        Self {
            local,
            policy: RebalancePolicy::default(),
            caches: DashMap::new(),
            management: None,
        }
    }

    pub fn with_rebalance_policy(mut self, policy: RebalancePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Management hook handed to every cache defined afterwards.
    pub fn with_management(mut self, management: Arc<dyn ManagementRegistration>) -> Self {
        self.management = Some(management);
        self
    }

    pub fn local_node(&self) -> &Node {
        &self.local
    }

    /// Defines and starts a cache owned, at first, by this node alone.
    pub fn define_cache(&self, name: &str, config: CacheConfig) -> Result<Arc<Cache>> {
        config.validate()?;
        let Entry::Vacant(slot) = self.caches.entry(name.to_string()) else {
            return Err(ClusterError::InvalidConfig(format!(
                "cache '{name}' is already defined"
            )));
        };

        let clustering = &config.clustering;
        let view = MembershipView::new(0, vec![self.local.clone()])
            .with_capacity(self.local.id, clustering.capacity_factor);
        let coordinator = TopologyCoordinator::new(
            name,
            clustering.factory_kind()?.build(),
            clustering,
            self.policy,
            &view,
        )?;

        let persistence = config
            .store
            .as_ref()
            .map(|store| Arc::new(PersistenceManager::from_config(name, store)));
        let mut cache = Cache::new(name, config.clone(), self.local.id, Arc::new(coordinator));
        if let Some(persistence) = persistence {
            cache = cache.with_persistence(persistence);
        }
        if let Some(management) = &self.management {
            cache = cache.with_management(management.clone());
        }

        let cache = Arc::new(cache);
        cache.start()?;
        slot.insert(cache.clone());
        debug!(cache = name, "defined cache");
        Ok(cache)
    }

    /// Registers a cache built by the caller, for instance one with custom
    /// stores. The cache is not started.
    pub fn register_cache(&self, cache: Arc<Cache>) -> Result<()> {
        match self.caches.entry(cache.name().to_string()) {
            Entry::Occupied(_) => Err(ClusterError::InvalidConfig(format!(
                "cache '{}' is already defined",
                cache.name()
            ))),
            Entry::Vacant(slot) => {
                slot.insert(cache);
                Ok(())
            }
        }
    }

    pub fn get_cache(&self, name: &str) -> Option<Arc<Cache>> {
        self.caches.get(name).map(|c| c.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Names of all registered caches, sorted.
    pub fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.iter().map(|c| c.key().clone()).collect();
        names.sort();
        names
    }

    pub fn remove_from_registry(&self, name: &str) -> Option<Arc<Cache>> {
        self.caches.remove(name).map(|(_, cache)| cache)
    }

    /// Applies a membership view to every cache, even after one of them
    /// fails.
    ///
    /// Each failure is logged; the first one is returned.
    pub fn handle_view(&self, view: &MembershipView) -> Result<()> {
        let mut first = None;
        for cache in self.caches.iter() {
            if let Err(e) = cache.coordinator().handle_view(view) {
                warn!(cache = cache.key().as_str(), view_id = view.view_id, error = %e, "failed to apply view");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}
