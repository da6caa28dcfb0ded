//! Child-set fingerprints for change detection
//!
//! A parent is considered changed on save when the [`Fingerprint`] of its
//! children differs from the one computed over the previously persisted
//! children.

use crate::id::EntityId;
use crate::version::VersionStamp;

/// Blake3 digest over an ordered list of child `(identity, stamp)` pairs
///
/// Only ever compared in memory; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Digest an ordered sequence of child `(identity, stamp)` pairs
    ///
    /// Order is significant. Children without an identity or stamp (not yet
    /// saved) are encoded with zero markers so they never collide with a
    /// saved child.
    #[must_use]
    pub fn of_children<I>(children: I) -> Self
    where
        I: IntoIterator<Item = (Option<EntityId>, Option<VersionStamp>)>,
    {
        let mut hasher = blake3::Hasher::new();
        let mut count: u64 = 0;
        for (id, stamp) in children {
            hasher.update(&id.map_or(0, EntityId::get).to_le_bytes());
            hasher.update(&stamp.map_or(0, VersionStamp::get).to_le_bytes());
            count += 1;
        }
        hasher.update(&count.to_le_bytes());
        Self(*hasher.finalize().as_bytes())
    }
}
