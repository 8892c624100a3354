//! XXH3 hash function.

use xxhash_rust::xxh3::xxh3_64;

use crate::hash::traits::HashFunction;

/// XXH3 64-bit folded down to 32 bits.
#[derive(Clone, Copy, Debug, Default)]
pub struct XxHash3;

impl HashFunction for XxHash3 {
    #[inline]
    fn hash(&self, key: &[u8]) -> u32 {
        let h = xxh3_64(key);
        (h ^ (h >> 32)) as u32
    }

    fn name(&self) -> &'static str {
        "XXH3"
    }
}
