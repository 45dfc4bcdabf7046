//! Built-in scan rule families.

pub mod dangerous;
pub mod entropy;
pub mod filetype;
pub mod network;
pub mod prompt_injection;
pub mod size;

use regex::Regex;

use super::{Finding, Severity, SkillContent};

/// One regex-backed pattern inside a rule family.
pub(crate) struct PatternSpec {
    pub regex: Regex,
    pub severity: Severity,
    pub message: &'static str,
}

impl PatternSpec {
    pub fn new(pattern: &str, severity: Severity, message: &'static str) -> Self {
        Self {
            // Built-in patterns are compile-time constants.
            regex: Regex::new(pattern).expect("built-in scan pattern must compile"),
            severity,
            message,
        }
    }
}

/// Scan every text file of the content line by line against a pattern
/// table, emitting one finding per (pattern, line) match.
pub(crate) fn scan_text_patterns(
    rule_id: &'static str,
    content: &SkillContent<'_>,
    patterns: &[PatternSpec],
    primary_only: bool,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (file, text) in content.text_files() {
        if primary_only && file.is_some() {
            continue;
        }
        for (idx, line) in text.lines().enumerate() {
            for spec in patterns {
                if let Some(matched) = spec.regex.find(line) {
                    findings.push(Finding {
                        rule: rule_id.to_string(),
                        severity: spec.severity,
                        skill_ref: content.skill_ref.to_string(),
                        file: file.map(str::to_string),
                        line: Some(idx + 1),
                        pattern: Some(truncate(matched.as_str(), 80)),
                        message: spec.message.to_string(),
                    });
                }
            }
        }
    }
    findings
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
