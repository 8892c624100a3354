//! Segment space: keys → segment indices.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash::{HashAlgorithm, HashFunction};

/// Index of a segment in `[0, num_segments)`.
pub type Segment = usize;

/// The key space divided into `num_segments` partitions.
///
/// A key belongs to segment `hash(key) mod num_segments`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentSpace {
    hash: HashAlgorithm,
    num_segments: usize,
}

impl SegmentSpace {
    pub fn new(hash: HashAlgorithm, num_segments: usize) -> Result<Self> {
        if num_segments == 0 {
            return Err(Error::invalid("the number of segments must be positive"));
        }
        // Segment indices are derived from a 32-bit hash.
        if num_segments > u32::MAX as usize {
            return Err(Error::invalid(format!(
                "the number of segments must not exceed {}, got {num_segments}",
                u32::MAX
            )));
        }
        Ok(Self { hash, num_segments })
    }

    #[inline]
    pub fn num_segments(&self) -> usize {
        self.num_segments
    }

    #[inline]
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash
    }

    /// Segment that `key` belongs to.
    #[inline]
    pub fn segment_of(&self, key: &[u8]) -> Segment {
        self.hash.hash(key) as usize % self.num_segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_segments_rejected() {
        assert!(SegmentSpace::new(HashAlgorithm::Murmur3, 0).is_err());
    }

    #[test]
    fn test_segment_in_range_and_stable() {
        let space = SegmentSpace::new(HashAlgorithm::Murmur3, 17).unwrap();
        for i in 0..1000 {
            let key = format!("key-{i}");
            let s = space.segment_of(key.as_bytes());
            assert!(s < 17);
            assert_eq!(s, space.segment_of(key.as_bytes()));
        }
    }

    #[test]
    fn test_single_segment_owns_everything() {
        let space = SegmentSpace::new(HashAlgorithm::Xxh3, 1).unwrap();
        assert_eq!(space.segment_of(b"anything"), 0);
    }
}
