//! `segmentctl inspect`: compute the table for a membership file.
//!
//! The membership file is a JSON array:
//!
//! ```json
//! [
//!   { "id": 1, "name": "a", "location": { "rack": "r1" }, "capacity_factor": 2.0 },
//!   { "id": 2, "name": "b" }
//! ]
//! ```

use std::path::Path;

use anyhow::Context;
use cluster::CacheConfig;
use corelib::{CapacityFactors, Location, Node, NodeId, DEFAULT_CAPACITY_FACTOR};
use distribution::{FactoryKind, OwnershipStatistics};
use serde::Deserialize;

use crate::config::InspectArgs;

#[derive(Debug, Deserialize)]
struct MemberEntry {
    id: u64,
    name: Option<String>,
    #[serde(default)]
    location: Location,
    capacity_factor: Option<f32>,
}

fn parse_members(json: &str) -> anyhow::Result<(Vec<Node>, CapacityFactors)> {
    let entries: Vec<MemberEntry> = serde_json::from_str(json)?;
    let mut factors = CapacityFactors::new();
    let members = entries
        .into_iter()
        .map(|entry| {
            let id = NodeId(u128::from(entry.id));
            factors.insert(id, entry.capacity_factor.unwrap_or(DEFAULT_CAPACITY_FACTOR));
            let name = entry.name.unwrap_or_else(|| format!("node{}", entry.id));
            Node::with_location(id, name, entry.location)
        })
        .collect();
    Ok((members, factors))
}

fn load_members(path: &Path) -> anyhow::Result<(Vec<Node>, CapacityFactors)> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_members(&json).with_context(|| format!("invalid membership file {}", path.display()))
}

pub fn run(args: InspectArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => CacheConfig::from_file(path)?,
        None => CacheConfig::default(),
    };
    let clustering = &config.clustering;
    let kind = match args.factory {
        Some(arg) => FactoryKind::from(arg),
        None => clustering.factory_kind()?,
    };
    let (members, factors) = load_members(&args.members)?;

    let factory = kind.build();
    let ch = factory.create(
        clustering.hash,
        clustering.num_owners,
        clustering.num_segments,
        &members,
        Some(&factors),
    )?;

    println!(
        "{} ({}), {} owners, hash {}, fingerprint {}",
        factory.name(),
        kind,
        ch.num_owners(),
        ch.hash_algorithm(),
        ch.fingerprint()?
    );
    print!("{}", OwnershipStatistics::from_ch(&ch));
    if args.table {
        print!("{}", ch.routing_table());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_members_with_defaults() {
        let (members, factors) = parse_members(
            r#"[
                { "id": 1, "name": "a", "location": { "rack": "r1" }, "capacity_factor": 2.0 },
                { "id": 2 }
            ]"#,
        )
        .unwrap();

        assert_eq!(members.len(), 2);
        assert_eq!(members[0].location.rack.as_deref(), Some("r1"));
        assert_eq!(members[1].name, "node2");
        assert_eq!(factors[&NodeId(1)], 2.0);
        assert_eq!(factors[&NodeId(2)], DEFAULT_CAPACITY_FACTOR);
    }

    #[test]
    fn test_parse_members_rejects_garbage() {
        assert!(parse_members(r#"{ "id": 1 }"#).is_err());
    }
}
