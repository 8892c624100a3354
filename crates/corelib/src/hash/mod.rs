//! Hash function abstraction for the segment space.
//!
//! A hash function turns an opaque key into a 32-bit value; the consistent
//! hash reduces that value to a segment. Nothing else in the placement logic
//! looks at the hash.

pub mod murmur3;
pub mod sip;
pub mod traits;
pub mod xxhash;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use murmur3::MurmurHash3;
pub use sip::SipHash13;
pub use traits::HashFunction;
pub use xxhash::XxHash3;

use crate::error::Error;

/// Closed set of hash functions a consistent hash can be built with.
///
/// Stored inside every [`ConsistentHash`](crate::ConsistentHash) so that all
/// nodes resolve keys to segments the same way.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Murmur3,
    Xxh3,
    Sip13,
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 3] = [
        HashAlgorithm::Murmur3,
        HashAlgorithm::Xxh3,
        HashAlgorithm::Sip13,
    ];
}

impl HashFunction for HashAlgorithm {
    #[inline]
    fn hash(&self, key: &[u8]) -> u32 {
        match self {
            HashAlgorithm::Murmur3 => MurmurHash3.hash(key),
            HashAlgorithm::Xxh3 => XxHash3.hash(key),
            HashAlgorithm::Sip13 => SipHash13.hash(key),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Murmur3 => MurmurHash3.name(),
            HashAlgorithm::Xxh3 => XxHash3.name(),
            HashAlgorithm::Sip13 => SipHash13.name(),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HashAlgorithm::Murmur3 => "murmur3",
            HashAlgorithm::Xxh3 => "xxh3",
            HashAlgorithm::Sip13 => "sip13",
        };
        f.write_str(s)
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "murmur3" => Ok(HashAlgorithm::Murmur3),
            "xxh3" => Ok(HashAlgorithm::Xxh3),
            "sip13" => Ok(HashAlgorithm::Sip13),
            other => Err(Error::invalid(format!("unknown hash function '{other}'"))),
        }
    }
}
