//! Shared core types used across configuration, store, and pipeline layers.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, coded};

/// Trust tier assigned to a source and inherited by its skills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustTier {
    Trusted,
    Review,
    Untrusted,
}

impl TrustTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustTier::Trusted => "trusted",
            TrustTier::Review => "review",
            TrustTier::Untrusted => "untrusted",
        }
    }
}

impl std::str::FromStr for TrustTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trusted" => Ok(TrustTier::Trusted),
            "review" => Ok(TrustTier::Review),
            "untrusted" => Ok(TrustTier::Untrusted),
            other => anyhow::bail!("Unknown trust tier: {other}"),
        }
    }
}

/// Source provider kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Git,
    Dir,
    Registry,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Git => "git",
            SourceKind::Dir => "dir",
            SourceKind::Registry => "registry",
        }
    }

    /// Parse a CLI kind token. `clawhub` is an accepted alias of the
    /// registry provider family.
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "git" => Ok(SourceKind::Git),
            "dir" => Ok(SourceKind::Dir),
            "registry" | "clawhub" => Ok(SourceKind::Registry),
            other => Err(coded(
                ErrorCode::SrcKind,
                format!("unknown source kind: {other} (expected git|dir|clawhub)"),
            )),
        }
    }
}

/// Moderation flags attached to a resolved skill package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationFlags {
    #[serde(default)]
    pub suspicious: bool,
    #[serde(default)]
    pub malware_blocked: bool,
}

/// Context affinity a skill declares in its SKILL.md frontmatter.
///
/// Used by the memory scoring engine to compute context-match subscores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextAffinity {
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,
    #[serde(default)]
    pub tasks: Vec<String>,
}

impl ContextAffinity {
    pub fn is_empty(&self) -> bool {
        self.languages.is_empty() && self.frameworks.is_empty() && self.tasks.is_empty()
    }
}

/// Validate a source name against `[a-z0-9][a-z0-9_-]*`.
pub fn validate_source_name(name: &str) -> anyhow::Result<()> {
    let mut chars = name.chars();
    let valid_head = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    let valid_tail = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if valid_head && valid_tail {
        return Ok(());
    }
    Err(coded(
        ErrorCode::SrcAdd,
        format!("invalid source name: {name:?} (expected [a-z0-9][a-z0-9_-]*)"),
    ))
}
