//! Identities: surrogate keys, stable pPod ids and local arena keys
//!
//! Three kinds of identity exist in the model:
//!
//! - [`EntityId`]: the persistent surrogate key, assigned once by the store
//!   on first save and never changed afterwards.
//! - [`PPodId`]: a client-visible UUID carried by OTUs, characters, OTU sets
//!   and matrices. It survives round trips through external formats.
//! - Local keys ([`OtuKey`], [`CharacterKey`], [`RowKey`], [`CellKey`]):
//!   indices into a single [`MatrixGraph`](crate::MatrixGraph)'s arenas. They
//!   are only meaningful inside the graph that issued them.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Persistent surrogate key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Wrap a raw key
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw key value
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stable client-visible identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PPodId(Uuid);

impl PPodId {
    /// Generate a fresh random id
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    #[inline]
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Underlying UUID
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PPodId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for PPodId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PPodId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

macro_rules! local_key {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Wrap a raw arena index
            #[inline]
            #[must_use]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Raw arena index
            #[inline]
            #[must_use]
            pub const fn get(self) -> u32 {
                self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

local_key!(
    /// Key of an OTU within one graph
    OtuKey,
    "otu:"
);
local_key!(
    /// Key of a character within one graph
    CharacterKey,
    "char:"
);
local_key!(
    /// Key of a row within one graph
    RowKey,
    "row:"
);
local_key!(
    /// Key of a cell within one graph
    CellKey,
    "cell:"
);
