//! pPod matrix model
//!
//! Versioned character-state matrices: taxa (OTUs), characters with numbered
//! states, and a grid of typed cells, each entity carrying a surrogate
//! identity and a version stamp.
//!
//! # Core Concepts
//!
//! - [`MatrixGraph`]: the aggregate owning one matrix and everything in it
//! - [`CharacterStateCell`] / [`validate_cell`]: typed cells and the type table
//! - [`Versioned`]: identity, version and dirty flag shared by all entities
//! - [`StampSource`] / [`PendingVersion`]: monotonic stamps, one per save
//! - [`Fingerprint`]: child-set digest used to detect parent changes
//! - [`EntityPath`]: where in the graph an error happened
//!
//! # Example
//!
//! ```rust,ignore
//! use ppod_model::{CellType, Character, MatrixGraph};
//!
//! let mut graph = MatrixGraph::new("primates");
//! let homo = graph.add_otu("Homo_sapiens")?;
//! graph.add_character(Character::new("tail").with_state(0, "absent").with_state(1, "present"))?;
//! graph.put_row(homo)?;
//! graph.set_cell(homo, 0, CellType::Single, [0])?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod cell;
mod character;
mod error;
mod fingerprint;
mod graph;
mod id;
mod matrix;
mod otu;
mod path;
mod row;
mod version;
mod versioned;

pub use cell::{validate_cell, CellPosition, CellType, CellValue, CharacterStateCell};
pub use character::{Character, CharacterState, StateNumber};
pub use error::ModelError;
pub use fingerprint::Fingerprint;
pub use graph::{EntityEntry, EntityKind, MatrixGraph};
pub use id::{CellKey, CharacterKey, EntityId, OtuKey, PPodId, RowKey};
pub use matrix::{CharacterStateMatrix, Column};
pub use otu::{Otu, OtuSet};
pub use path::EntityPath;
pub use row::CharacterStateRow;
pub use version::{AtomicStampAllocator, PendingVersion, StampSource, VersionInfo, VersionStamp};
pub use versioned::Versioned;

/// Common imports
pub mod prelude {
    pub use crate::{
        CellType, Character, EntityId, EntityPath, MatrixGraph, ModelError, OtuKey, PPodId,
        StampSource, VersionInfo, VersionStamp,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
