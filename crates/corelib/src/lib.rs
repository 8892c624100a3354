//! Core library for segment-based consistent hashing.
//!
//! This crate provides the fundamental abstractions for data placement:
//! - Members and their fault-domain locations
//! - Hash functions mapping keys into the segment space
//! - The immutable `ConsistentHash` segment → owners table
//!
//! Computing a new table (on join, leave or load imbalance) is the job of
//! the factories in the `distribution` crate.

pub mod ch;
pub mod error;
pub mod hash;
pub mod node;
pub mod topology;

pub use ch::consistent_hash::capacity_vector;
pub use ch::{ConsistentHash, Segment, SegmentSpace};
pub use error::{Error, Result};
pub use hash::{HashAlgorithm, HashFunction};
pub use node::{CapacityFactors, Node, NodeId, DEFAULT_CAPACITY_FACTOR};
pub use topology::Location;
