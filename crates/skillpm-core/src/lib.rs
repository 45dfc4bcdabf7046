//! Skillpm Core Library
//!
//! Domain logic for the local-first skill package manager: source
//! providers, the install pipeline, security scanning, agent adapters,
//! the sync engine, and the memory pipeline.

pub mod adapter;
pub mod commands;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod installer;
pub mod lockfile;
pub mod memory;
pub mod resolver;
pub mod scanner;
pub mod schedule;
pub mod source;
pub mod store;
pub mod sync;
pub mod types;

/// Re-exports of commonly used types
pub mod prelude {
    // Errors
    pub use crate::error::{CodedError, ErrorCode, code_of, coded, exit_code_of};

    // Configuration
    pub use crate::config::{Config, ConfigStore, Paths, SourceConfig};
    pub use crate::types::{SourceKind, TrustTier};

    // Pipeline
    pub use crate::installer::{InstallOptions, InstallReport, Installer, UninstallReport};
    pub use crate::resolver::{Constraint, Resolver, SkillRef};
    pub use crate::source::{SkillPackage, SourceProvider, provider_for};

    // Store
    pub use crate::lockfile::{LockEntry, Lockfile, LockfileStore};
    pub use crate::store::{BlobStore, InstalledSkill, InstalledState, StateStore};

    // Adapters & scanning
    pub use crate::adapter::{Adapter, AdapterRegistry, HarvestCandidate};
    pub use crate::scanner::{Finding, ScanReport, Scanner, Severity, enforce};

    // Sync
    pub use crate::sync::{SyncEngine, SyncMode, SyncReport, SyncRun, SyncSummary};

    // Memory
    pub use crate::memory::{
        EventKind, EventLog, FeedbackLog, Observer, ScoreBoard, ScoreStore, SkillIndex,
    };
}
