//! Configuration schema, paths, and persistence.

pub mod paths;
pub mod schema;
pub mod store;

pub use paths::Paths;
pub use schema::{
    Config, HalfLife, MemorySettings, ScanSettings, SchedulerMode, SchedulerSettings,
    SecurityProfile, SecuritySettings, SourceConfig,
};
pub use store::ConfigStore;
