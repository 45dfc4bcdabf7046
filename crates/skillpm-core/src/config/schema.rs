//! Configuration schema for config.toml.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, coded};
use crate::types::{SourceKind, TrustTier, validate_source_name};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Configured sources, unique by name.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    #[serde(default)]
    pub security: SecuritySettings,

    #[serde(default)]
    pub scan: ScanSettings,

    #[serde(default)]
    pub memory: MemorySettings,

    #[serde(default)]
    pub scheduler: SchedulerSettings,
}

impl Config {
    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Add a source. Names must be unique and match `[a-z0-9][a-z0-9_-]*`;
    /// locations must fit the source kind.
    pub fn add_source(&mut self, source: SourceConfig) -> anyhow::Result<()> {
        validate_source_name(&source.name)?;
        source.validate_location()?;
        if self.source(&source.name).is_some() {
            return Err(coded(
                ErrorCode::SrcAdd,
                format!("source already exists: {}", source.name),
            ));
        }
        self.sources.push(source);
        self.sources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(())
    }

    pub fn remove_source(&mut self, name: &str) -> anyhow::Result<SourceConfig> {
        let idx = self
            .sources
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| coded(ErrorCode::SrcRemove, format!("unknown source: {name}")))?;
        Ok(self.sources.remove(idx))
    }
}

/// A named, addressable collection of skills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub kind: SourceKind,
    /// URL or filesystem path, depending on kind.
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Ordered subtrees searched for skills. Empty means the source root.
    #[serde(default)]
    pub scan_paths: Vec<String>,
    #[serde(default = "default_trust_tier")]
    pub trust_tier: TrustTier,
}

impl SourceConfig {
    /// Registry locations must be absolute http(s) URLs. Git locations
    /// may be URLs, scp-style remotes, or local paths; directory
    /// locations are paths.
    pub fn validate_location(&self) -> anyhow::Result<()> {
        match self.kind {
            SourceKind::Registry => {
                let parsed = url::Url::parse(&self.location).map_err(|err| {
                    coded(
                        ErrorCode::SrcAdd,
                        format!("registry location is not a URL: {} ({err})", self.location),
                    )
                })?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(coded(
                        ErrorCode::SrcAdd,
                        format!("registry location must be http(s): {}", self.location),
                    ));
                }
            }
            SourceKind::Git | SourceKind::Dir => {
                if self.location.trim().is_empty() {
                    return Err(coded(
                        ErrorCode::SrcAdd,
                        format!("empty location for source {}", self.name),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn default_trust_tier() -> TrustTier {
    TrustTier::Review
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityProfile {
    Strict,
    Permissive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySettings {
    #[serde(default = "default_profile")]
    pub profile: SecurityProfile,
}

fn default_profile() -> SecurityProfile {
    SecurityProfile::Strict
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            profile: default_profile(),
        }
    }
}

/// Security scan settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Findings at or above this severity block without --force.
    #[serde(default = "default_block_severity")]
    pub block_severity: crate::scanner::Severity,
    /// Rule ids that are never evaluated.
    #[serde(default)]
    pub disabled_rules: Vec<String>,
}

fn default_block_severity() -> crate::scanner::Severity {
    crate::scanner::Severity::High
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            block_severity: default_block_severity(),
            disabled_rules: Vec::new(),
        }
    }
}

/// Recency half-life options for activation scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HalfLife {
    #[serde(rename = "3d")]
    ThreeDays,
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "14d")]
    FourteenDays,
}

impl HalfLife {
    pub fn days(&self) -> f64 {
        match self {
            HalfLife::ThreeDays => 3.0,
            HalfLife::SevenDays => 7.0,
            HalfLife::FourteenDays => 14.0,
        }
    }
}

/// Memory pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_working_memory_max")]
    pub working_memory_max: usize,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_half_life")]
    pub recency_half_life: HalfLife,
    #[serde(default = "default_true")]
    pub observe_on_sync: bool,
    #[serde(default)]
    pub adaptive_inject: bool,
    #[serde(default)]
    pub bridge_enabled: bool,
    #[serde(default)]
    pub rules_injection: bool,
    #[serde(default = "default_rules_scope")]
    pub rules_scope: String,
}

fn default_working_memory_max() -> usize {
    7
}

fn default_threshold() -> f64 {
    0.3
}

fn default_half_life() -> HalfLife {
    HalfLife::SevenDays
}

fn default_rules_scope() -> String {
    "project".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            working_memory_max: default_working_memory_max(),
            threshold: default_threshold(),
            recency_half_life: default_half_life(),
            observe_on_sync: true,
            adaptive_inject: false,
            bridge_enabled: false,
            rules_injection: false,
            rules_scope: default_rules_scope(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerMode {
    #[default]
    Off,
    System,
}

/// Platform scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default)]
    pub mode: SchedulerMode,
    /// Sync interval, e.g. "1h" or "30m".
    #[serde(default = "default_interval")]
    pub interval: String,
}

fn default_interval() -> String {
    "1h".to_string()
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            mode: SchedulerMode::Off,
            interval: default_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(name: &str) -> SourceConfig {
        SourceConfig {
            name: name.to_string(),
            kind: SourceKind::Git,
            location: "https://example.com/skills.git".to_string(),
            branch: None,
            scan_paths: vec![],
            trust_tier: TrustTier::Review,
        }
    }

    #[test]
    fn add_source_rejects_duplicates() {
        let mut config = Config::default();
        config.add_source(source("local")).unwrap();
        let err = config.add_source(source("local")).unwrap_err();
        assert!(err.to_string().starts_with("SRC_ADD:"));
    }

    #[test]
    fn add_source_keeps_names_sorted() {
        let mut config = Config::default();
        config.add_source(source("zeta")).unwrap();
        config.add_source(source("alpha")).unwrap();
        let names: Vec<_> = config.sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn remove_unknown_source_is_coded() {
        let mut config = Config::default();
        let err = config.remove_source("ghost").unwrap_err();
        assert!(err.to_string().starts_with("SRC_REMOVE:"));
    }

    #[test]
    fn registry_locations_must_be_http_urls() {
        let mut config = Config::default();
        let mut hub = source("hub");
        hub.kind = SourceKind::Registry;
        hub.location = "/srv/not-a-url".to_string();
        let err = config.add_source(hub.clone()).unwrap_err();
        assert!(err.to_string().starts_with("SRC_ADD:"));

        hub.location = "https://hub.example.com/v1".to_string();
        config.add_source(hub).unwrap();
    }

    #[test]
    fn defaults_round_trip_through_toml() {
        let config = Config::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.memory.working_memory_max, 7);
        assert_eq!(parsed.memory.recency_half_life, HalfLife::SevenDays);
        assert_eq!(parsed.scheduler.mode, SchedulerMode::Off);
    }
}
