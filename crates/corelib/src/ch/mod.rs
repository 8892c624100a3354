//! Consistent hash: the segment → owners mapping.
//!
//! The key space is split into a fixed number of segments; a
//! [`ConsistentHash`] records, for each segment, the ordered list of members
//! holding its data (primary first, then backups).

pub mod consistent_hash;
pub mod segment;

pub use consistent_hash::ConsistentHash;
pub use segment::{Segment, SegmentSpace};
