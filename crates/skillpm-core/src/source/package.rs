//! Resolved skill packages and listing metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::{ContextAffinity, ModerationFlags, TrustTier};

/// Logical content of a resolved skill: the primary instruction document
/// plus ancillary files keyed by relative path.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillPackage {
    pub source: String,
    pub slug: String,
    /// Resolved version label: semver or `0.0.0+<scm>.<rev>`.
    pub version: String,
    pub primary: String,
    pub ancillary: BTreeMap<String, Vec<u8>>,
    /// `sha256:<hex>` over the canonical serialization.
    pub checksum: String,
    /// Checksum the provider declared for this payload, when it has one
    /// independent of the content (registry catalogs).
    pub declared_checksum: Option<String>,
    /// `<source-location>@<version-or-rev>`.
    pub source_ref: String,
    pub trust_tier: TrustTier,
    pub moderation: ModerationFlags,
    pub affinity: ContextAffinity,
    pub description: Option<String>,
}

impl SkillPackage {
    /// Canonical `source/slug` key.
    pub fn key(&self) -> String {
        format!("{}/{}", self.source, self.slug)
    }
}

/// Compute the content checksum: sha256 over the primary document, then
/// each ancillary entry in lexicographic path order as
/// `path || 0x00 || content || 0x00`.
pub fn compute_checksum(primary: &str, ancillary: &BTreeMap<String, Vec<u8>>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(primary.as_bytes());
    for (path, content) in ancillary {
        hasher.update(path.as_bytes());
        hasher.update([0x00]);
        hasher.update(content);
        hasher.update([0x00]);
    }
    format!("sha256:{:x}", hasher.finalize())
}

/// Hex digest part of a `sha256:<hex>` checksum.
pub fn checksum_hex(checksum: &str) -> &str {
    checksum.strip_prefix("sha256:").unwrap_or(checksum)
}

/// Listing metadata for one skill within a source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillMetadata {
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Published semver versions, ascending.
    #[serde(default)]
    pub versions: Vec<semver::Version>,
    /// Default-branch head revision, when the source has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_rev: Option<String>,
    /// Branch name to head revision.
    #[serde(default)]
    pub branch_revs: BTreeMap<String, String>,
}

/// Marker returned by a provider refresh that observed a new revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionMarker(pub String);

/// Concrete version picked by the resolver for a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    /// Version label recorded in state and lockfile.
    pub label: String,
    /// SCM revision backing the label, when one exists.
    pub rev: Option<String>,
}

/// Frontmatter fields parsed from a SKILL.md primary document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkillManifest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub version: Option<semver::Version>,
    pub affinity: ContextAffinity,
}

/// Parse the `---` delimited frontmatter of a primary document.
///
/// List-valued keys (`languages`, `frameworks`, `tasks`) accept
/// comma-separated values. Unknown keys are ignored.
pub fn parse_manifest(primary: &str) -> SkillManifest {
    let mut manifest = SkillManifest::default();
    let mut lines = primary.lines();
    if lines.next() != Some("---") {
        return manifest;
    }
    for line in lines {
        if line.trim() == "---" {
            break;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "name" => manifest.name = Some(value.to_string()),
            "description" => manifest.description = Some(value.to_string()),
            "version" => manifest.version = semver::Version::parse(value).ok(),
            "languages" => manifest.affinity.languages = split_list(value),
            "frameworks" => manifest.affinity.frameworks = split_list(value),
            "tasks" => manifest.affinity.tasks = split_list(value),
            _ => {}
        }
    }
    manifest
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|part| part.trim().to_lowercase())
        .filter(|part| !part.is_empty())
        .collect()
}
