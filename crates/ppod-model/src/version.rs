//! Version stamps and their allocation
//!
//! # Core Concepts
//!
//! - [`VersionStamp`]: a monotonic integer; larger means newer.
//! - [`VersionInfo`]: a stamp plus its creation time. Every entity changed by
//!   one save shares the same `VersionInfo`.
//! - [`StampSource`]: the allocator contract consumed by reconciliation.
//! - [`AtomicStampAllocator`]: lock-free process-wide implementation.
//! - [`PendingVersion`]: per-save lazy holder; allocates on first use only,
//!   so an unchanged save never advances the allocator.

use chrono::{DateTime, Utc};
use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic version number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionStamp(u64);

impl VersionStamp {
    /// Wrap a raw stamp
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw stamp value
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Display for VersionStamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A version stamp and the time it was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionInfo {
    stamp: VersionStamp,
    created: DateTime<Utc>,
}

impl VersionInfo {
    /// Create version info
    #[inline]
    #[must_use]
    pub const fn new(stamp: VersionStamp, created: DateTime<Utc>) -> Self {
        Self { stamp, created }
    }

    /// The stamp
    #[inline]
    #[must_use]
    pub const fn stamp(&self) -> VersionStamp {
        self.stamp
    }

    /// When the stamp was issued
    #[inline]
    #[must_use]
    pub const fn created(&self) -> DateTime<Utc> {
        self.created
    }
}

/// Source of fresh version stamps
///
/// # Invariants
/// Each issued stamp is strictly greater than every stamp issued before it.
pub trait StampSource: Send + Sync {
    /// Issue the next stamp
    fn next_version_stamp(&self) -> VersionInfo;

    /// Most recently issued stamp, if any
    fn last_issued(&self) -> Option<VersionStamp>;
}

/// Lock-free monotonic allocator
#[derive(Debug, Default)]
pub struct AtomicStampAllocator {
    last: AtomicU64,
}

impl AtomicStampAllocator {
    /// Allocator whose first stamp is 1
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Allocator seeded past the highest stamp already persisted
    #[inline]
    #[must_use]
    pub const fn starting_after(highest: VersionStamp) -> Self {
        Self {
            last: AtomicU64::new(highest.0),
        }
    }
}

impl StampSource for AtomicStampAllocator {
    fn next_version_stamp(&self) -> VersionInfo {
        let raw = self.last.fetch_add(1, Ordering::AcqRel) + 1;
        let info = VersionInfo::new(VersionStamp(raw), Utc::now());
        tracing::trace!("issued version stamp {}", info.stamp);
        info
    }

    fn last_issued(&self) -> Option<VersionStamp> {
        match self.last.load(Ordering::Acquire) {
            0 => None,
            raw => Some(VersionStamp(raw)),
        }
    }
}

/// The one version shared by every entity changed in a single save
///
/// Nothing is allocated until [`get`](Self::get) is first called.
pub struct PendingVersion<'a> {
    source: &'a dyn StampSource,
    cell: OnceCell<VersionInfo>,
}

impl<'a> PendingVersion<'a> {
    /// Bind to a stamp source without allocating
    #[inline]
    #[must_use]
    pub fn new(source: &'a dyn StampSource) -> Self {
        Self {
            source,
            cell: OnceCell::new(),
        }
    }

    /// The save's version, allocating it on first call
    #[must_use]
    pub fn get(&self) -> VersionInfo {
        *self.cell.get_or_init(|| self.source.next_version_stamp())
    }

    /// The save's version if one was allocated
    #[inline]
    #[must_use]
    pub fn allocated(&self) -> Option<VersionInfo> {
        self.cell.get().copied()
    }
}

impl fmt::Debug for PendingVersion<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingVersion")
            .field("allocated", &self.cell.get())
            .finish_non_exhaustive()
    }
}
