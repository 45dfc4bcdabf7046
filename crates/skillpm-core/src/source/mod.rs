//! Source providers: fetch skill listings and content for a source kind.
//!
//! Providers materialize into a per-source cache and never mutate
//! installed state. All three kinds implement the same three-verb
//! contract: list, fetch, refresh.

pub mod dir;
pub mod git;
pub mod package;
pub mod registry;

use std::collections::BTreeMap;

use crate::config::{Paths, SourceConfig};
use crate::types::SourceKind;

pub use package::{
    RevisionMarker, ResolvedVersion, SkillMetadata, SkillPackage, checksum_hex, compute_checksum,
    parse_manifest,
};

/// The provider contract shared by git, directory, and registry sources.
pub trait SourceProvider {
    /// Source name this provider serves.
    fn source_name(&self) -> &str;

    /// Provider kind, used for synthetic version labels.
    fn kind(&self) -> SourceKind;

    /// Enumerate available skills.
    fn list(&self) -> anyhow::Result<BTreeMap<String, SkillMetadata>>;

    /// Fetch a skill at a resolved version.
    fn fetch(&self, slug: &str, version: &ResolvedVersion) -> anyhow::Result<SkillPackage>;

    /// Refresh the source cache. Returns a marker when a new revision was
    /// observed; fails with `SRC_UNREACHABLE` on network error.
    fn refresh(&self) -> anyhow::Result<Option<RevisionMarker>>;
}

/// Build the provider for a configured source.
pub fn provider_for(
    source: &SourceConfig,
    paths: &Paths,
) -> Box<dyn SourceProvider> {
    match source.kind {
        SourceKind::Dir => Box::new(dir::DirProvider::new(
            source.clone(),
            paths.source_cache_dir(&source.name),
        )),
        SourceKind::Git => Box::new(git::GitProvider::new(
            source.clone(),
            paths.source_cache_dir(&source.name),
        )),
        SourceKind::Registry => Box::new(registry::RegistryProvider::new(
            source.clone(),
            paths.source_cache_dir(&source.name),
        )),
    }
}

/// SCM label used in synthetic `0.0.0+<scm>.<rev>` versions.
pub fn scm_label(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::Git => "git",
        SourceKind::Dir => "dir",
        SourceKind::Registry => "reg",
    }
}
