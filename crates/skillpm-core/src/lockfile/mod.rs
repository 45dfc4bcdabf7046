//! Lockfile types and persistence.

pub mod store;
pub mod types;

pub use store::LockfileStore;
pub use types::{LockEntry, Lockfile};
