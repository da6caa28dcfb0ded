//! pPod save reconciliation
//!
//! Takes a client-submitted character-state matrix and merges it into the
//! stored one. Identities of unchanged entities survive, changed entities
//! get the save's version stamp, and nothing is written unless the whole
//! graph is valid.
//!
//! # Core Concepts
//!
//! - [`ReconcileEngine`]: validate, merge, version and commit in one call
//! - [`MatchPlan`]: which incoming OTU or character is which stored one
//! - [`ReconcileConfig`]: matching policies, parallel validation, pPod ids
//! - [`ReconcileReport`]: created, updated, removed and unchanged entities
//!
//! # Example
//!
//! ```rust,ignore
//! use ppod_reconcile::prelude::*;
//! use std::sync::Arc;
//!
//! let engine = ReconcileEngine::new(
//!     Arc::new(InMemoryMatrixStore::new()),
//!     Arc::new(AtomicStampAllocator::new()),
//! );
//! let first = engine.reconcile(&submitted, None)?;
//! let id = first.report.matrix_id();
//!
//! // Re-submitting the loaded graph unchanged allocates no stamp.
//! let again = engine.reconcile(&first.graph, Some(id))?;
//! assert!(again.report.is_noop());
//! ```

#![warn(unreachable_pub)]

mod config;
mod engine;
mod error;
mod matching;
mod report;
mod validate;

pub use config::{MatchPolicy, ReconcileConfig};
pub use engine::{CancellationToken, ReconcileEngine, ReconcileOutcome};
pub use error::ReconcileError;
pub use matching::{MatchPlan, Matches};
pub use report::{EntityChange, ReconcileReport};
pub use validate::validate;

/// Common imports
pub mod prelude {
    pub use crate::{
        CancellationToken, MatchPolicy, ReconcileConfig, ReconcileEngine, ReconcileError,
        ReconcileOutcome, ReconcileReport,
    };
    pub use ppod_model::{AtomicStampAllocator, MatrixGraph};
    pub use ppod_store::{InMemoryMatrixStore, MatrixRepository};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
