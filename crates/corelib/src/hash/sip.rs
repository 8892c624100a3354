//! SipHash-1-3 hash function.

use std::hash::Hasher;

use siphasher::sip::SipHasher13;

use crate::hash::traits::HashFunction;

/// Fixed key so every node computes the same hash.
const SIP_KEYS: (u64, u64) = (0x0706_0504_0302_0100, 0x0f0e_0d0c_0b0a_0908);

/// SipHash-1-3 with a fixed key, folded down to 32 bits.
#[derive(Clone, Copy, Debug, Default)]
pub struct SipHash13;

impl HashFunction for SipHash13 {
    fn hash(&self, key: &[u8]) -> u32 {
        let mut hasher = SipHasher13::new_with_keys(SIP_KEYS.0, SIP_KEYS.1);
        hasher.write(key);
        let h = hasher.finish();
        (h ^ (h >> 32)) as u32
    }

    fn name(&self) -> &'static str {
        "SipHash13"
    }
}
