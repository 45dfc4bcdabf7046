//! Skill reference resolution.
//!
//! Parses `source/name[@constraint]` refs and resolves constraints to
//! concrete versions or revisions against a source listing.

pub mod refs;

use std::collections::BTreeMap;

use crate::error::{ErrorCode, coded};
use crate::source::{ResolvedVersion, SkillMetadata, SourceProvider, scm_label};

pub use refs::{Constraint, SkillRef};

/// Outcome of resolving a ref against its source.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub skill_ref: SkillRef,
    pub version: ResolvedVersion,
}

/// Resolves refs against a set of named providers.
pub struct Resolver<'a> {
    providers: &'a BTreeMap<String, Box<dyn SourceProvider>>,
}

impl<'a> Resolver<'a> {
    pub fn new(providers: &'a BTreeMap<String, Box<dyn SourceProvider>>) -> Self {
        Self { providers }
    }

    /// Parse and resolve a ref string.
    pub fn resolve_str(&self, input: &str) -> anyhow::Result<Resolution> {
        let skill_ref = SkillRef::parse(input)?;
        self.resolve(skill_ref)
    }

    /// Resolve a parsed ref.
    pub fn resolve(&self, skill_ref: SkillRef) -> anyhow::Result<Resolution> {
        let provider = self.providers.get(&skill_ref.source).ok_or_else(|| {
            coded(
                ErrorCode::ResUnknownSource,
                format!("unknown source: {}", skill_ref.source),
            )
        })?;
        let listing = provider.list()?;
        let metadata = listing.get(&skill_ref.slug).ok_or_else(|| {
            coded(
                ErrorCode::ResUnknownSkill,
                format!("unknown skill {} in source {}", skill_ref.slug, skill_ref.source),
            )
        })?;
        let version = resolve_version(&skill_ref, metadata, scm_label(provider.kind()))?;
        Ok(Resolution { skill_ref, version })
    }

    pub fn provider(&self, source: &str) -> anyhow::Result<&dyn SourceProvider> {
        self.providers
            .get(source)
            .map(|p| p.as_ref())
            .ok_or_else(|| coded(ErrorCode::ResUnknownSource, format!("unknown source: {source}")))
    }
}

/// Resolve a constraint against listing metadata.
///
/// Order within a source: exact version match, highest semver satisfying a
/// range, branch head, literal revision token. Without a constraint the
/// highest stable semver wins, falling back to the default branch head
/// with a synthetic `0.0.0+<scm>.<rev>` label.
pub fn resolve_version(
    skill_ref: &SkillRef,
    metadata: &SkillMetadata,
    scm: &str,
) -> anyhow::Result<ResolvedVersion> {
    match &skill_ref.constraint {
        Constraint::Exact(version) => {
            if metadata.versions.contains(version) {
                Ok(ResolvedVersion {
                    label: version.to_string(),
                    rev: None,
                })
            } else {
                Err(no_version(skill_ref, &format!("version {version} not published")))
            }
        }
        Constraint::Range(req) => {
            let best = metadata
                .versions
                .iter()
                .filter(|v| req.matches(v))
                .max()
                .ok_or_else(|| {
                    no_version(skill_ref, &format!("no published version satisfies {req}"))
                })?;
            Ok(ResolvedVersion {
                label: best.to_string(),
                rev: None,
            })
        }
        Constraint::Branch(branch) => {
            let rev = metadata.branch_revs.get(branch).ok_or_else(|| {
                no_version(skill_ref, &format!("unknown branch {branch}"))
            })?;
            Ok(ResolvedVersion {
                label: synthetic_label(scm, rev),
                rev: Some(rev.clone()),
            })
        }
        Constraint::Rev(rev) => Ok(ResolvedVersion {
            label: synthetic_label(scm, rev),
            rev: Some(rev.clone()),
        }),
        Constraint::Latest => {
            let best_stable = metadata
                .versions
                .iter()
                .filter(|v| v.pre.is_empty())
                .max();
            if let Some(version) = best_stable {
                return Ok(ResolvedVersion {
                    label: version.to_string(),
                    rev: None,
                });
            }
            let rev = metadata.default_rev.as_ref().ok_or_else(|| {
                no_version(skill_ref, "no stable version and no default revision")
            })?;
            Ok(ResolvedVersion {
                label: synthetic_label(scm, rev),
                rev: Some(rev.clone()),
            })
        }
    }
}

fn synthetic_label(scm: &str, rev: &str) -> String {
    let short = &rev[..rev.len().min(12)];
    format!("0.0.0+{scm}.{short}")
}

fn no_version(skill_ref: &SkillRef, detail: &str) -> anyhow::Error {
    coded(
        ErrorCode::ResNoVersion,
        format!("{}/{}: {detail}", skill_ref.source, skill_ref.slug),
    )
}
