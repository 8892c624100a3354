//! `segmentctl simulate`: grow a cluster one member at a time.

use std::time::{Duration, Instant};

use anyhow::{ensure, Context};
use cluster::{ClusteringConfig, MembershipView, RebalancePolicy, TopologyCoordinator};
use corelib::{ConsistentHash, Location, Node, NodeId};
use distribution::{FactoryKind, OwnershipStatistics};
use tracing::info;

use crate::config::SimulateArgs;

pub async fn run(args: SimulateArgs) -> anyhow::Result<()> {
    ensure!(args.initial > 0, "--initial must be at least 1");
    ensure!(args.racks != Some(0), "--racks must be at least 1");

    let report = tokio::task::spawn_blocking(move || simulate(&args))
        .await
        .context("simulation task panicked")??;
    print!("{report}");
    Ok(())
}

fn member(index: usize, racks: Option<usize>) -> Node {
    Node::with_location(
        NodeId(index as u128 + 1),
        format!("node{index}"),
        Location::new(
            Some("site0".to_string()),
            racks.map(|r| format!("rack{}", index % r)),
            Some(format!("machine{index}")),
        ),
    )
}

/// Owner copies present in `new` but not in `old`.
fn added_owners(old: &ConsistentHash, new: &ConsistentHash) -> usize {
    (0..new.num_segments())
        .map(|s| {
            new.owners_of(s)
                .iter()
                .filter(|id| !old.owners_of(s).contains(id))
                .count()
        })
        .sum()
}

fn simulate(args: &SimulateArgs) -> anyhow::Result<String> {
    let kind = FactoryKind::from(args.factory);
    let config = ClusteringConfig {
        num_owners: args.owners,
        num_segments: args.segments,
        hash: args.hash.into(),
        factory: kind.to_string(),
        ..ClusteringConfig::default()
    };
    config.validate()?;

    let total = args.initial + args.join;
    let members: Vec<Node> = (0..total).map(|i| member(i, args.racks)).collect();

    let started = Instant::now();
    let coordinator = TopologyCoordinator::new(
        "simulation",
        kind.build(),
        &config,
        RebalancePolicy::Immediate,
        &MembershipView::new(1, members[..args.initial].to_vec()),
    )?;
    let mut out = format!(
        "{kind}: created {} segments for {} members in {:?}\n",
        args.segments,
        args.initial,
        started.elapsed()
    );

    let mut moved = 0;
    let mut slowest = Duration::ZERO;
    for (step, count) in (args.initial + 1..=total).enumerate() {
        let started = Instant::now();
        let view = MembershipView::new(step as u64 + 2, members[..count].to_vec());
        let topology = coordinator.handle_view(&view)?;
        let moves = match &topology.pending_ch {
            Some(pending) => {
                let moves = added_owners(&topology.current_ch, pending);
                coordinator.complete_rebalance(topology.rebalance_id);
                moves
            }
            None => 0,
        };
        let elapsed = started.elapsed();
        slowest = slowest.max(elapsed);
        moved += moves;
        info!(members = count, moves, elapsed = ?elapsed, "member joined");
    }

    let ch = coordinator.holder().read_ch();
    let stats = OwnershipStatistics::from_ch(&ch);
    out.push_str(&format!(
        "{} joins: {moved} owner copies moved, slowest join {slowest:?}, total {:?}\n",
        args.join,
        started.elapsed()
    ));
    out.push_str(&format!(
        "primary balanced: {}, max primary deviation {:.2}, max owned deviation {:.2}\n",
        stats.is_primary_balanced(),
        stats.max_primary_deviation(),
        stats.max_owned_deviation()
    ));
    out.push_str(&stats.to_string());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FactoryArg, HashArg};

    fn args(factory: FactoryArg) -> SimulateArgs {
        SimulateArgs {
            factory,
            initial: 2,
            join: 3,
            owners: 2,
            segments: 30,
            racks: Some(2),
            hash: HashArg::Murmur3,
        }
    }

    #[test]
    fn test_simulation_reports_balance() {
        for factory in [FactoryArg::Default, FactoryArg::Topology, FactoryArg::Sync] {
            let report = simulate(&args(factory)).unwrap();
            assert!(report.contains("3 joins"), "{report}");
            assert!(report.contains("primary balanced: true"), "{report}");
            assert!(report.contains("node4"), "{report}");
        }
    }

    #[test]
    fn test_added_owners_counts_new_copies() {
        let members = vec![member(0, None), member(1, None)];
        let factory = FactoryKind::Default.build();
        let one = factory
            .create(corelib::HashAlgorithm::Murmur3, 1, 4, &members[..1], None)
            .unwrap();
        let two = factory
            .rebalance(&factory.update_members(&one, &members, None).unwrap())
            .unwrap();
        assert_eq!(added_owners(&one, &two), 2);
    }
}
