//! Tests for topology publication under concurrent readers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cluster::{ClusteringConfig, MembershipView, RebalancePolicy, TopologyCoordinator};
use corelib::{Node, NodeId};
use distribution::FactoryKind;
use tokio::sync::watch;

fn nodes(count: u128) -> Vec<Node> {
    (1..=count).map(|i| Node::new(NodeId(i), format!("node{i}"))).collect()
}

fn coordinator(policy: RebalancePolicy) -> TopologyCoordinator {
    let config = ClusteringConfig {
        num_segments: 64,
        ..ClusteringConfig::default()
    };
    TopologyCoordinator::new(
        "concurrent",
        FactoryKind::Default.build(),
        &config,
        policy,
        &MembershipView::new(1, nodes(2)),
    )
    .unwrap()
}

#[test]
fn test_readers_see_whole_snapshots() {
    let coordinator = coordinator(RebalancePolicy::Immediate);
    let done = AtomicBool::new(false);

    crossbeam::scope(|s| {
        for _ in 0..4 {
            s.spawn(|_| {
                let mut last_id = 0;
                while !done.load(Ordering::Acquire) {
                    let topology = coordinator.holder().load();
                    assert!(topology.topology_id >= last_id);
                    last_id = topology.topology_id;

                    // Every write owner set covers the read owners.
                    let (read, write) = (topology.read_ch(), topology.write_ch());
                    for segment in 0..read.num_segments() {
                        for owner in read.owners_of(segment) {
                            assert!(write.owners_of(segment).contains(owner));
                        }
                    }
                    assert_eq!(topology.is_rebalancing(), topology.pending_ch.is_some());
                }
            });
        }

        for view_id in 2..20u64 {
            let members = nodes(2 + view_id as u128 % 5);
            let topology = coordinator
                .handle_view(&MembershipView::new(view_id, members))
                .unwrap();
            if topology.is_rebalancing() {
                coordinator.complete_rebalance(topology.rebalance_id);
            }
        }
        done.store(true, Ordering::Release);
    })
    .unwrap();

    let last = coordinator.holder().load();
    assert!(!last.is_rebalancing());
    assert_eq!(last.read_ch().members().len(), 6);
}

#[tokio::test]
async fn test_run_applies_latest_view() {
    let coordinator = Arc::new(coordinator(RebalancePolicy::Manual));
    let (tx, rx) = watch::channel(MembershipView::new(1, nodes(2)));
    let task = tokio::spawn(coordinator.clone().run(rx));

    tx.send(MembershipView::new(2, nodes(3))).unwrap();
    tx.send(MembershipView::new(3, nodes(4))).unwrap();

    let mut applied = false;
    for _ in 0..100 {
        if coordinator.holder().read_ch().members().len() == 4 {
            applied = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(applied, "latest view was not applied");

    drop(tx);
    task.await.unwrap();
    assert!(!coordinator.holder().load().is_rebalancing());
}
