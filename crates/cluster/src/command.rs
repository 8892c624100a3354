//! Commands replicated to every node of the cluster.

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, info, warn};

use crate::cache::CacheManager;
use crate::error::{ClusterError, Result};

/// A command broadcast to and performed on every node.
#[async_trait]
pub trait ReplicableCommand: Send + Sync {
    /// Wire identifier, unique per command type.
    fn command_id(&self) -> u8;

    /// Whether the caller waits for a value in the response.
    fn is_return_value_expected(&self) -> bool;

    /// Whether performing the command may block, so it must not run on a
    /// thread that delivers other messages.
    fn can_block(&self) -> bool;

    /// Frame sent over the wire, starting with [`command_id`](Self::command_id).
    fn encode(&self) -> Bytes;

    async fn perform(&self, manager: &CacheManager) -> Result<()>;
}

/// Removes a cache from this node.
///
/// Stops local processing of the cache, clears its stores, unregisters its
/// management hook and finally drops it from the registry. Only a failure
/// to stop is reported to the caller; the cleanup steps after it log their
/// failures and carry on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoveCacheCommand {
    cache_name: String,
}

impl RemoveCacheCommand {
    pub const COMMAND_ID: u8 = 18;

    pub fn new(cache_name: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
        }
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// Parses a frame produced by [`encode`](ReplicableCommand::encode).
    pub fn decode(mut frame: Bytes) -> Result<Self> {
        if frame.remaining() < 5 {
            return Err(ClusterError::Malformed(format!(
                "frame of {} bytes is too short",
                frame.remaining()
            )));
        }
        let id = frame.get_u8();
        if id != Self::COMMAND_ID {
            return Err(ClusterError::Malformed(format!(
                "expected command {}, got {id}",
                Self::COMMAND_ID
            )));
        }
        let len = frame.get_u32() as usize;
        if frame.remaining() != len {
            return Err(ClusterError::Malformed(format!(
                "cache name length {len} does not match {} remaining bytes",
                frame.remaining()
            )));
        }
        let name = String::from_utf8(frame.to_vec())
            .map_err(|e| ClusterError::Malformed(e.to_string()))?;
        Ok(Self::new(name))
    }
}

#[async_trait]
impl ReplicableCommand for RemoveCacheCommand {
    fn command_id(&self) -> u8 {
        Self::COMMAND_ID
    }

    fn is_return_value_expected(&self) -> bool {
        false
    }

    fn can_block(&self) -> bool {
        true
    }

    fn encode(&self) -> Bytes {
        let name = self.cache_name.as_bytes();
        let mut buf = BytesMut::with_capacity(5 + name.len());
        buf.put_u8(Self::COMMAND_ID);
        buf.put_u32(name.len() as u32);
        buf.put_slice(name);
        buf.freeze()
    }

    async fn perform(&self, manager: &CacheManager) -> Result<()> {
        let name = self.cache_name.as_str();
        let Some(cache) = manager.get_cache(name) else {
            debug!(cache = name, "cache not defined here, nothing to remove");
            return Ok(());
        };

        cache.stop()?;

        if let Some(persistence) = cache.persistence() {
            if let Err(e) = persistence.clear_all_stores() {
                warn!(cache = name, error = %e, "failed to clear stores of removed cache");
            }
        }
        if let Some(management) = cache.management() {
            if let Err(e) = management.unregister(name) {
                warn!(cache = name, error = %e, "failed to unregister removed cache");
            }
        }

        manager.remove_from_registry(name);
        info!(cache = name, "removed cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_flags() {
        let command = RemoveCacheCommand::new("users");
        assert_eq!(command.command_id(), 18);
        assert!(!command.is_return_value_expected());
        assert!(command.can_block());
    }

    #[test]
    fn test_frame_layout() {
        let frame = RemoveCacheCommand::new("ab").encode();
        assert_eq!(&frame[..], &[18, 0, 0, 0, 2, b'a', b'b']);
        assert_eq!(
            RemoveCacheCommand::decode(frame).unwrap(),
            RemoveCacheCommand::new("ab")
        );
    }

    #[test]
    fn test_malformed_frames_rejected() {
        for frame in [
            &[18u8, 0][..],
            &[17, 0, 0, 0, 1, b'a'][..],
            &[18, 0, 0, 0, 5, b'a'][..],
            &[18, 0, 0, 0, 1, 0xff][..],
        ] {
            assert!(matches!(
                RemoveCacheCommand::decode(Bytes::copy_from_slice(frame)),
                Err(ClusterError::Malformed(_))
            ));
        }
    }
}
