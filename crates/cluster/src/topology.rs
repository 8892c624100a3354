//! Cache topology publication and coordination.
//!
//! The topology of a cache is an immutable [`CacheTopology`] published
//! through a [`TopologyHolder`]. Readers load an `Arc` snapshot and keep
//! using it for as long as their operation runs; the coordinator computes
//! the next topology off to the side and publishes it with a single atomic
//! swap. Nobody ever sees a half-updated table.
//!
//! # Rebalance lifecycle
//!
//! ```text
//! view change ──> update_members ──> current' (pending cleared)
//!                                        │
//!                      start_rebalance ──┘──> pending = rebalance(current')
//!                                             union   = current' ∪ pending
//!                                                 │
//!              complete_rebalance(rebalance_id) ──┘──> current = pending
//! ```

use std::sync::Arc;

use arc_swap::ArcSwap;
use corelib::{CapacityFactors, ConsistentHash, Node, NodeId};
use distribution::ConsistentHashFactory;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ClusteringConfig;
use crate::error::Result;

/// Placement state of one cache at one point in time.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheTopology {
    /// Increases with every published topology.
    pub topology_id: u64,
    /// Id of the latest rebalance started for this cache.
    pub rebalance_id: u64,
    pub current_ch: Arc<ConsistentHash>,
    pub pending_ch: Option<Arc<ConsistentHash>>,
    pub union_ch: Option<Arc<ConsistentHash>>,
}

impl CacheTopology {
    pub fn new(current_ch: ConsistentHash) -> Self {
        Self {
            topology_id: 0,
            rebalance_id: 0,
            current_ch: Arc::new(current_ch),
            pending_ch: None,
            union_ch: None,
        }
    }

    pub fn is_rebalancing(&self) -> bool {
        self.pending_ch.is_some()
    }

    /// Table reads are routed with.
    pub fn read_ch(&self) -> &Arc<ConsistentHash> {
        &self.current_ch
    }

    /// Table writes are routed with: both old and new owners while a
    /// rebalance is in flight.
    pub fn write_ch(&self) -> &Arc<ConsistentHash> {
        self.union_ch.as_ref().unwrap_or(&self.current_ch)
    }
}

/// Atomically replaceable reference to the current [`CacheTopology`].
pub struct TopologyHolder {
    inner: ArcSwap<CacheTopology>,
}

impl TopologyHolder {
    pub fn new(initial: CacheTopology) -> Self {
        Self {
            inner: ArcSwap::from_pointee(initial),
        }
    }

    /// Snapshot of the current topology.
    pub fn load(&self) -> Arc<CacheTopology> {
        self.inner.load_full()
    }

    pub fn read_ch(&self) -> Arc<ConsistentHash> {
        self.inner.load().current_ch.clone()
    }

    pub fn write_ch(&self) -> Arc<ConsistentHash> {
        self.inner.load().write_ch().clone()
    }

    fn publish(&self, topology: CacheTopology) {
        self.inner.store(Arc::new(topology));
    }
}

/// Full membership snapshot delivered on every view change.
#[derive(Clone, Debug, PartialEq)]
pub struct MembershipView {
    pub view_id: u64,
    pub members: Vec<Node>,
    pub capacity_factors: CapacityFactors,
}

impl MembershipView {
    /// View where every member has the default capacity factor.
    pub fn new(view_id: u64, members: Vec<Node>) -> Self {
        let capacity_factors = members
            .iter()
            .map(|m| (m.id, corelib::DEFAULT_CAPACITY_FACTOR))
            .collect();
        Self {
            view_id,
            members,
            capacity_factors,
        }
    }

    pub fn with_capacity(mut self, member: NodeId, capacity_factor: f32) -> Self {
        self.capacity_factors.insert(member, capacity_factor);
        self
    }
}

/// When the coordinator rebalances after a membership change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RebalancePolicy {
    /// Start a rebalance right after every view change.
    #[default]
    Immediate,
    /// Wait for an explicit [`TopologyCoordinator::start_rebalance`].
    Manual,
}

#[derive(Debug, Default)]
struct CoordinatorState {
    last_view_id: u64,
}

/// Computes and publishes the topology of one cache.
///
/// Writers are serialized by an internal lock; readers only ever touch the
/// [`TopologyHolder`].
pub struct TopologyCoordinator {
    cache: String,
    factory: Arc<dyn ConsistentHashFactory>,
    policy: RebalancePolicy,
    holder: Arc<TopologyHolder>,
    state: Mutex<CoordinatorState>,
}

impl TopologyCoordinator {
    /// Builds the first table of `cache` from `view`.
    pub fn new(
        cache: impl Into<String>,
        factory: Arc<dyn ConsistentHashFactory>,
        config: &ClusteringConfig,
        policy: RebalancePolicy,
        view: &MembershipView,
    ) -> Result<Self> {
        let cache = cache.into();
        let ch = factory.create(
            config.hash,
            config.num_owners,
            config.num_segments,
            &view.members,
            Some(&view.capacity_factors),
        )?;
        info!(
            cache = %cache,
            factory = factory.name(),
            members = view.members.len(),
            segments = config.num_segments,
            "created initial topology"
        );
        Ok(Self {
            cache,
            factory,
            policy,
            holder: Arc::new(TopologyHolder::new(CacheTopology::new(ch))),
            state: Mutex::new(CoordinatorState {
                last_view_id: view.view_id,
            }),
        })
    }

    pub fn holder(&self) -> &Arc<TopologyHolder> {
        &self.holder
    }

    pub fn policy(&self) -> RebalancePolicy {
        self.policy
    }

    /// Applies a membership change.
    ///
    /// Views not newer than the last one applied are ignored. A rebalance
    /// still in flight is cancelled: its pending table was computed for
    /// members that may be gone.
    pub fn handle_view(&self, view: &MembershipView) -> Result<Arc<CacheTopology>> {
        let mut state = self.state.lock();
        if view.view_id <= state.last_view_id {
            debug!(cache = %self.cache, view_id = view.view_id, "ignoring stale view");
            return Ok(self.holder.load());
        }

        let current = self.holder.load();
        let ch = self.factory.update_members(
            &current.current_ch,
            &view.members,
            Some(&view.capacity_factors),
        )?;
        if current.is_rebalancing() {
            info!(
                cache = %self.cache,
                rebalance_id = current.rebalance_id,
                "cancelled rebalance after view change"
            );
        }
        self.holder.publish(CacheTopology {
            topology_id: current.topology_id + 1,
            rebalance_id: current.rebalance_id,
            current_ch: Arc::new(ch),
            pending_ch: None,
            union_ch: None,
        });
        state.last_view_id = view.view_id;
        debug!(
            cache = %self.cache,
            view_id = view.view_id,
            members = view.members.len(),
            "applied membership view"
        );

        if self.policy == RebalancePolicy::Immediate {
            self.begin_rebalance()?;
        }
        Ok(self.holder.load())
    }

    /// Starts moving segments towards a balanced table.
    ///
    /// Returns the new rebalance id, or `None` when a rebalance is already
    /// running or the table is balanced.
    pub fn start_rebalance(&self) -> Result<Option<u64>> {
        let _state = self.state.lock();
        self.begin_rebalance()
    }

    /// Must be called with the state lock held.
    fn begin_rebalance(&self) -> Result<Option<u64>> {
        let current = self.holder.load();
        if current.is_rebalancing() {
            debug!(cache = %self.cache, rebalance_id = current.rebalance_id, "rebalance already running");
            return Ok(None);
        }

        let pending = self.factory.rebalance(&current.current_ch)?;
        if pending == *current.current_ch {
            debug!(cache = %self.cache, "topology already balanced");
            return Ok(None);
        }
        let union = self.factory.union(&current.current_ch, &pending)?;

        let rebalance_id = current.rebalance_id + 1;
        self.holder.publish(CacheTopology {
            topology_id: current.topology_id + 1,
            rebalance_id,
            current_ch: current.current_ch.clone(),
            pending_ch: Some(Arc::new(pending)),
            union_ch: Some(Arc::new(union)),
        });
        info!(cache = %self.cache, rebalance_id, "started rebalance");
        Ok(Some(rebalance_id))
    }

    /// Installs the pending table once state transfer has finished.
    ///
    /// Returns `false` for a rebalance id that is no longer current.
    pub fn complete_rebalance(&self, rebalance_id: u64) -> bool {
        let _state = self.state.lock();
        let current = self.holder.load();
        let Some(pending) = current.pending_ch.clone() else {
            debug!(cache = %self.cache, rebalance_id, "no rebalance in progress");
            return false;
        };
        if current.rebalance_id != rebalance_id {
            debug!(
                cache = %self.cache,
                rebalance_id,
                current = current.rebalance_id,
                "ignoring stale rebalance completion"
            );
            return false;
        }

        self.holder.publish(CacheTopology {
            topology_id: current.topology_id + 1,
            rebalance_id,
            current_ch: pending,
            pending_ch: None,
            union_ch: None,
        });
        info!(cache = %self.cache, rebalance_id, "completed rebalance");
        true
    }

    /// Applies views from `views` until the sender goes away.
    ///
    /// Views that arrive while one is being applied are coalesced: only the
    /// latest is handled.
    pub async fn run(self: Arc<Self>, mut views: watch::Receiver<MembershipView>) {
        loop {
            let view = views.borrow_and_update().clone();
            if let Err(e) = self.handle_view(&view) {
                warn!(cache = %self.cache, view_id = view.view_id, error = %e, "failed to apply view");
            }
            if views.changed().await.is_err() {
                debug!(cache = %self.cache, "membership channel closed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use distribution::FactoryKind;

    fn nodes(ids: &[u128]) -> Vec<Node> {
        ids.iter().map(|&i| Node::new(NodeId(i), format!("node{i}"))).collect()
    }

    fn config() -> ClusteringConfig {
        ClusteringConfig {
            num_segments: 16,
            ..ClusteringConfig::default()
        }
    }

    fn coordinator(policy: RebalancePolicy) -> TopologyCoordinator {
        TopologyCoordinator::new(
            "test",
            FactoryKind::Default.build(),
            &config(),
            policy,
            &MembershipView::new(1, nodes(&[1, 2])),
        )
        .unwrap()
    }

    #[test]
    fn test_join_starts_rebalance() {
        let coordinator = coordinator(RebalancePolicy::Immediate);
        let topology = coordinator
            .handle_view(&MembershipView::new(2, nodes(&[1, 2, 3])))
            .unwrap();

        assert!(topology.is_rebalancing());
        assert_eq!(topology.rebalance_id, 1);
        assert_eq!(topology.topology_id, 2);
        assert_eq!(topology.read_ch().owned_segments_count(&NodeId(3)), 0);
        assert!(topology.write_ch().owned_segments_count(&NodeId(3)) > 0);

        assert!(coordinator.complete_rebalance(1));
        let done = coordinator.holder().load();
        assert!(!done.is_rebalancing());
        assert!(done.read_ch().primary_segments_count(&NodeId(3)) >= 5);
    }

    #[test]
    fn test_manual_policy_waits() {
        let coordinator = coordinator(RebalancePolicy::Manual);
        let topology = coordinator
            .handle_view(&MembershipView::new(2, nodes(&[1, 2, 3])))
            .unwrap();
        assert!(!topology.is_rebalancing());

        let id = coordinator.start_rebalance().unwrap();
        assert_eq!(id, Some(1));
        assert_eq!(coordinator.start_rebalance().unwrap(), None);
    }

    #[test]
    fn test_stale_view_and_completion_ignored() {
        let coordinator = coordinator(RebalancePolicy::Immediate);
        coordinator
            .handle_view(&MembershipView::new(3, nodes(&[1, 2, 3])))
            .unwrap();
        let before = coordinator.holder().load();

        let after = coordinator
            .handle_view(&MembershipView::new(2, nodes(&[1])))
            .unwrap();
        assert_eq!(after, before);
        assert!(!coordinator.complete_rebalance(7));
    }

    #[test]
    fn test_view_change_cancels_rebalance() {
        let coordinator = coordinator(RebalancePolicy::Immediate);
        coordinator
            .handle_view(&MembershipView::new(2, nodes(&[1, 2, 3])))
            .unwrap();
        let topology = coordinator
            .handle_view(&MembershipView::new(3, nodes(&[1, 3])))
            .unwrap();

        // The old rebalance is gone; a new one was started for {1, 3}.
        assert_eq!(topology.rebalance_id, 2);
        assert!(!coordinator.complete_rebalance(1));
        assert!(coordinator.complete_rebalance(2));
        assert!(!coordinator.holder().read_ch().is_member(&NodeId(2)));
    }

    #[test]
    fn test_balanced_table_needs_no_rebalance() {
        let coordinator = coordinator(RebalancePolicy::Manual);
        assert_eq!(coordinator.start_rebalance().unwrap(), None);
    }
}
