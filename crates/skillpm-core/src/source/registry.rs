//! Registry ("clawhub") source provider.
//!
//! Talks to a remote catalog over HTTP and caches both the index and
//! fetched payloads, so read operations keep working offline once a
//! source has been refreshed.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::SourceConfig;
use crate::error::{ErrorCode, coded};
use crate::fsutil::{atomic_write, atomic_write_str};
use crate::types::{ModerationFlags, SourceKind};

use super::package::{
    ResolvedVersion, RevisionMarker, SkillMetadata, SkillPackage, compute_checksum, parse_manifest,
};
use super::SourceProvider;

/// Remote catalog index.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogIndex {
    #[serde(default)]
    skills: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogEntry {
    slug: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    versions: Vec<String>,
    #[serde(default)]
    suspicious: bool,
    #[serde(default)]
    malware_blocked: bool,
}

/// Remote payload for one skill version.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogPayload {
    primary: String,
    #[serde(default)]
    ancillary: BTreeMap<String, String>,
    #[serde(default)]
    checksum: Option<String>,
    #[serde(default)]
    suspicious: bool,
    #[serde(default)]
    malware_blocked: bool,
}

#[derive(Debug)]
pub struct RegistryProvider {
    source: SourceConfig,
    cache_dir: PathBuf,
}

impl RegistryProvider {
    pub fn new(source: SourceConfig, cache_dir: PathBuf) -> Self {
        Self { source, cache_dir }
    }

    fn index_url(&self) -> String {
        format!("{}/index.json", self.source.location.trim_end_matches('/'))
    }

    fn payload_url(&self, slug: &str, version: &str) -> String {
        format!(
            "{}/skills/{slug}/{version}.json",
            self.source.location.trim_end_matches('/')
        )
    }

    fn cached_index_path(&self) -> PathBuf {
        self.cache_dir.join("index.json")
    }

    fn cached_payload_path(&self, slug: &str, version: &str) -> PathBuf {
        self.cache_dir.join(format!("{slug}-{version}.json"))
    }

    fn http_get(&self, url: &str) -> anyhow::Result<String> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        let response = client.get(url).send().map_err(|err| {
            coded(
                ErrorCode::SrcUnreachable,
                format!("registry {} unreachable: {err}", self.source.name),
            )
        })?;
        if !response.status().is_success() {
            return Err(coded(
                ErrorCode::SrcUnreachable,
                format!(
                    "registry {} returned {} for {url}",
                    self.source.name,
                    response.status()
                ),
            ));
        }
        response.text().map_err(|err| {
            coded(
                ErrorCode::SrcUnreachable,
                format!("registry {} read failed: {err}", self.source.name),
            )
        })
    }

    /// Load the cached index, fetching it once when the cache is cold.
    fn load_index(&self) -> anyhow::Result<CatalogIndex> {
        let path = self.cached_index_path();
        let body = if path.exists() {
            std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read cached index: {}", path.display()))?
        } else {
            let body = self.http_get(&self.index_url())?;
            atomic_write_str(&path, &body)?;
            body
        };
        serde_json::from_str(&body).with_context(|| {
            format!("Failed to parse registry index for source {}", self.source.name)
        })
    }

    fn load_payload(&self, slug: &str, version: &str) -> anyhow::Result<CatalogPayload> {
        let path = self.cached_payload_path(slug, version);
        let body = if path.exists() {
            std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read cached payload: {}", path.display()))?
        } else {
            let body = self.http_get(&self.payload_url(slug, version))?;
            atomic_write(&path, body.as_bytes())?;
            body
        };
        serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse registry payload for {slug}@{version}"))
    }
}

impl SourceProvider for RegistryProvider {
    fn source_name(&self) -> &str {
        &self.source.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Registry
    }

    fn list(&self) -> anyhow::Result<BTreeMap<String, SkillMetadata>> {
        let index = self.load_index()?;
        let mut listing = BTreeMap::new();
        for entry in index.skills {
            let mut versions: Vec<semver::Version> = entry
                .versions
                .iter()
                .filter_map(|v| semver::Version::parse(v).ok())
                .collect();
            versions.sort();
            listing.insert(
                entry.slug.clone(),
                SkillMetadata {
                    slug: entry.slug,
                    description: entry.description,
                    versions,
                    default_rev: None,
                    branch_revs: BTreeMap::new(),
                },
            );
        }
        Ok(listing)
    }

    fn fetch(&self, slug: &str, version: &ResolvedVersion) -> anyhow::Result<SkillPackage> {
        let index = self.load_index()?;
        let entry = index
            .skills
            .iter()
            .find(|e| e.slug == slug)
            .ok_or_else(|| {
                coded(
                    ErrorCode::ResUnknownSkill,
                    format!("unknown skill {slug} in source {}", self.source.name),
                )
            })?;

        let payload = self.load_payload(slug, &version.label)?;
        let ancillary: BTreeMap<String, Vec<u8>> = payload
            .ancillary
            .iter()
            .map(|(path, content)| (path.clone(), content.clone().into_bytes()))
            .collect();
        let manifest = parse_manifest(&payload.primary);
        let checksum = compute_checksum(&payload.primary, &ancillary);
        debug!(source = %self.source.name, slug, version = %version.label, "fetched registry payload");

        Ok(SkillPackage {
            source: self.source.name.clone(),
            slug: slug.to_string(),
            version: version.label.clone(),
            primary: payload.primary,
            ancillary,
            checksum,
            declared_checksum: payload.checksum,
            source_ref: format!("{}@{}", self.source.location, version.label),
            trust_tier: self.source.trust_tier,
            moderation: ModerationFlags {
                suspicious: entry.suspicious || payload.suspicious,
                malware_blocked: entry.malware_blocked || payload.malware_blocked,
            },
            affinity: manifest.affinity,
            description: manifest.description,
        })
    }

    fn refresh(&self) -> anyhow::Result<Option<RevisionMarker>> {
        let body = self.http_get(&self.index_url())?;
        let digest = format!("{:x}", Sha256::digest(body.as_bytes()));
        let marker = digest[..12].to_string();

        let marker_path = self.cache_dir.join("last_rev");
        let previous = std::fs::read_to_string(&marker_path).ok();
        atomic_write_str(&self.cached_index_path(), &body)?;
        if previous.as_deref() == Some(marker.as_str()) {
            return Ok(None);
        }
        atomic_write_str(&marker_path, &marker)?;
        Ok(Some(RevisionMarker(marker)))
    }
}
