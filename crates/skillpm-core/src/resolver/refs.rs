//! Skill reference parsing: `source/name[@constraint]`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, coded};

/// Version constraint attached to a skill ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// No constraint: latest satisfying version.
    Latest,
    /// Exact version, e.g. `1.2.3`.
    Exact(semver::Version),
    /// Semver range, e.g. `^1.0`.
    Range(semver::VersionReq),
    /// Branch head, e.g. `branch=main`.
    Branch(String),
    /// Commit or tag token, e.g. `rev=4f2a91c`.
    Rev(String),
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Latest => Ok(()),
            Constraint::Exact(v) => write!(f, "{v}"),
            Constraint::Range(r) => write!(f, "{r}"),
            Constraint::Branch(b) => write!(f, "branch={b}"),
            Constraint::Rev(r) => write!(f, "rev={r}"),
        }
    }
}

/// Parsed skill reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillRef {
    pub source: String,
    pub slug: String,
    pub constraint: Constraint,
}

impl SkillRef {
    /// Canonical `source/slug` key used in installed-state and lockfile.
    pub fn key(&self) -> String {
        format!("{}/{}", self.source, self.slug)
    }

    /// Parse `source/name[@constraint]`.
    pub fn parse(input: &str) -> anyhow::Result<Self> {
        let (head, constraint) = match input.split_once('@') {
            Some((head, tail)) => (head, parse_constraint(input, tail)?),
            None => (input, Constraint::Latest),
        };

        let (source, slug) = head.split_once('/').ok_or_else(|| {
            coded(
                ErrorCode::ResRef,
                format!("malformed skill ref: {input:?} (expected source/name[@constraint])"),
            )
        })?;

        if source.is_empty() || slug.is_empty() || slug.contains('/') {
            return Err(coded(
                ErrorCode::ResRef,
                format!("malformed skill ref: {input:?} (expected source/name[@constraint])"),
            ));
        }

        Ok(Self {
            source: source.to_string(),
            slug: slug.to_string(),
            constraint,
        })
    }
}

impl fmt::Display for SkillRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.slug)?;
        if self.constraint != Constraint::Latest {
            write!(f, "@{}", self.constraint)?;
        }
        Ok(())
    }
}

impl Serialize for SkillRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SkillRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        SkillRef::parse(&raw).map_err(serde::de::Error::custom)
    }
}

fn parse_constraint(input: &str, raw: &str) -> anyhow::Result<Constraint> {
    if raw.is_empty() {
        return Err(coded(
            ErrorCode::ResRef,
            format!("empty constraint in skill ref: {input:?}"),
        ));
    }
    if let Some(branch) = raw.strip_prefix("branch=") {
        if branch.is_empty() {
            return Err(coded(
                ErrorCode::ResRef,
                format!("empty branch constraint in skill ref: {input:?}"),
            ));
        }
        return Ok(Constraint::Branch(branch.to_string()));
    }
    if let Some(rev) = raw.strip_prefix("rev=") {
        if rev.is_empty() {
            return Err(coded(
                ErrorCode::ResRef,
                format!("empty rev constraint in skill ref: {input:?}"),
            ));
        }
        return Ok(Constraint::Rev(rev.to_string()));
    }
    if let Ok(version) = semver::Version::parse(raw) {
        return Ok(Constraint::Exact(version));
    }
    if let Ok(req) = semver::VersionReq::parse(raw) {
        return Ok(Constraint::Range(req));
    }
    Err(coded(
        ErrorCode::ResRef,
        format!("unparseable constraint {raw:?} in skill ref: {input:?}"),
    ))
}
