//! Security scanner: a rule engine over resolved skill content.
//!
//! Each rule exposes an identifier and a scan verb; the scanner walks an
//! ordered registry, skipping disabled rule ids, and produces a report
//! with deterministically sorted findings.

pub mod policy;
pub mod rules;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::source::SkillPackage;

pub use policy::enforce;

/// Finding severity, ordered.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Severity::Info),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => anyhow::bail!("Unknown severity: {other}"),
        }
    }
}

/// One scan finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub rule: String,
    pub severity: Severity,
    pub skill_ref: String,
    /// Ancillary file path; `None` for the primary document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// Matched pattern excerpt, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    pub message: String,
}

/// Scan report for one or more skills.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    pub findings: Vec<Finding>,
}

impl ScanReport {
    pub fn max_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    /// Sort findings by (skill ref, rule id, file, line).
    fn sort(&mut self) {
        self.findings.sort_by(|a, b| {
            (&a.skill_ref, &a.rule, &a.file, a.line).cmp(&(&b.skill_ref, &b.rule, &b.file, b.line))
        });
    }
}

/// Borrowed view of skill content handed to rules.
#[derive(Debug, Clone, Copy)]
pub struct SkillContent<'a> {
    pub skill_ref: &'a str,
    pub primary: &'a str,
    pub ancillary: &'a BTreeMap<String, Vec<u8>>,
}

impl<'a> SkillContent<'a> {
    pub fn of(package: &'a SkillPackage, skill_ref: &'a str) -> Self {
        Self {
            skill_ref,
            primary: &package.primary,
            ancillary: &package.ancillary,
        }
    }

    /// Iterate text content: the primary doc (file `None`) then every
    /// UTF-8 decodable ancillary file.
    pub fn text_files(&self) -> impl Iterator<Item = (Option<&'a str>, &'a str)> {
        std::iter::once((None, self.primary)).chain(
            self.ancillary
                .iter()
                .filter_map(|(path, bytes)| {
                    std::str::from_utf8(bytes).ok().map(|text| (Some(path.as_str()), text))
                }),
        )
    }
}

/// One scan rule: identifier plus a scan verb.
pub trait ScanRule {
    fn id(&self) -> &'static str;
    fn scan(&self, content: &SkillContent<'_>) -> Vec<Finding>;
}

/// Ordered rule registry.
pub struct Scanner {
    rules: Vec<Box<dyn ScanRule>>,
    disabled: BTreeSet<String>,
}

impl Scanner {
    /// Scanner with the built-in rule families.
    pub fn with_default_rules(disabled: &[String]) -> Self {
        Self {
            rules: vec![
                Box::new(rules::dangerous::DangerousPatternRule::new()),
                Box::new(rules::prompt_injection::PromptInjectionRule::new()),
                Box::new(rules::filetype::FileTypeRule::new()),
                Box::new(rules::size::SizeAnomalyRule::new()),
                Box::new(rules::entropy::EntropyRule::new()),
                Box::new(rules::network::NetworkIndicatorRule::new()),
            ],
            disabled: disabled.iter().cloned().collect(),
        }
    }

    /// Scanner over an explicit rule list (tests, embedders).
    pub fn new(rules: Vec<Box<dyn ScanRule>>, disabled: &[String]) -> Self {
        Self {
            rules,
            disabled: disabled.iter().cloned().collect(),
        }
    }

    pub fn scan(&self, content: &SkillContent<'_>) -> ScanReport {
        let mut report = ScanReport::default();
        for rule in &self.rules {
            if self.disabled.contains(rule.id()) {
                continue;
            }
            report.findings.extend(rule.scan(content));
        }
        report.sort();
        report
    }
}
