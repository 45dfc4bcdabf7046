//! Persisted state: installed skills, injections, and the blob store.

pub mod blobs;
pub mod state;

pub use blobs::BlobStore;
pub use state::{InstalledSkill, InstalledState, StateStore};
