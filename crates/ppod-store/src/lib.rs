//! pPod matrix store
//!
//! The persistence side of reconciliation: the [`MatrixRepository`] contract
//! the engine consumes, an [`InMemoryMatrixStore`] implementation, and
//! [`MatrixLocks`] providing one writer per matrix identity.
//!
//! # Example
//!
//! ```rust,ignore
//! use ppod_store::{InMemoryMatrixStore, MatrixRepository};
//!
//! let store = InMemoryMatrixStore::new();
//! let lock = store.lock_matrix(id);
//! let _guard = lock.lock();
//! let graph = store.load_matrix(id)?;
//! ```

#![warn(unreachable_pub)]

mod error;
mod locks;
mod memory;
mod repository;

pub use error::StoreError;
pub use locks::{MatrixLock, MatrixLocks};
pub use memory::InMemoryMatrixStore;
pub use repository::MatrixRepository;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
