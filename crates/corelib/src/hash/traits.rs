//! Core hash function trait definitions.

/// A hash function converts keys into 32-bit values that pick a segment.
///
/// Hash functions are stateless and thread-safe, and must return the same
/// value for the same key on every node.
pub trait HashFunction: Send + Sync + 'static {
    /// Hashes a key.
    fn hash(&self, key: &[u8]) -> u32;

    /// Returns the name of this hash function.
    fn name(&self) -> &'static str;
}
