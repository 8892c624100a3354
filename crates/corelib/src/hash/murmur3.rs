//! MurmurHash3, x86 32-bit variant.

use crate::hash::traits::HashFunction;

/// Seed used for key hashing, shared by every node.
pub const DEFAULT_SEED: u32 = 9001;

const C1: u32 = 0xcc9e_2d51;
const C2: u32 = 0x1b87_3593;

/// MurmurHash3 with the cluster-wide seed.
#[derive(Clone, Copy, Debug, Default)]
pub struct MurmurHash3;

impl HashFunction for MurmurHash3 {
    #[inline]
    fn hash(&self, key: &[u8]) -> u32 {
        murmur3_32(key, DEFAULT_SEED)
    }

    fn name(&self) -> &'static str {
        "MurmurHash3"
    }
}

/// MurmurHash3_x86_32 over `data` with the given seed.
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let mut h = seed;
    let mut blocks = data.chunks_exact(4);

    for block in &mut blocks {
        let k = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        h ^= mix_k(k);
        h = h.rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        let k = tail
            .iter()
            .enumerate()
            .fold(0u32, |k, (i, b)| k ^ (u32::from(*b) << (8 * i)));
        h ^= mix_k(k);
    }

    h ^= data.len() as u32;
    fmix32(h)
}

#[inline]
fn mix_k(k: u32) -> u32 {
    k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2)
}

#[inline]
fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}
