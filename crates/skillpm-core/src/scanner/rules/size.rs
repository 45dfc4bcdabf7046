//! Size anomaly detection.

use crate::scanner::{Finding, ScanRule, Severity, SkillContent};

const MAX_SINGLE_FILE: usize = 500 * 1024;
const MAX_TOTAL_ANCILLARY: usize = 5 * 1024 * 1024;
const MAX_PRIMARY: usize = 100 * 1024;
const MAX_ANCILLARY_COUNT: usize = 50;

pub struct SizeAnomalyRule;

impl SizeAnomalyRule {
    pub fn new() -> Self {
        Self
    }

    fn finding(
        &self,
        content: &SkillContent<'_>,
        file: Option<&str>,
        severity: Severity,
        message: String,
    ) -> Finding {
        Finding {
            rule: self.id().to_string(),
            severity,
            skill_ref: content.skill_ref.to_string(),
            file: file.map(str::to_string),
            line: None,
            pattern: None,
            message,
        }
    }
}

impl Default for SizeAnomalyRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanRule for SizeAnomalyRule {
    fn id(&self) -> &'static str {
        "size-anomaly"
    }

    fn scan(&self, content: &SkillContent<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();

        if content.primary.len() > MAX_PRIMARY {
            findings.push(self.finding(
                content,
                None,
                Severity::Medium,
                format!(
                    "primary document is {} KiB (limit {} KiB)",
                    content.primary.len() / 1024,
                    MAX_PRIMARY / 1024
                ),
            ));
        }

        let mut total = 0usize;
        for (path, bytes) in content.ancillary {
            total += bytes.len();
            if bytes.len() > MAX_SINGLE_FILE {
                findings.push(self.finding(
                    content,
                    Some(path),
                    Severity::Medium,
                    format!(
                        "file is {} KiB (limit {} KiB)",
                        bytes.len() / 1024,
                        MAX_SINGLE_FILE / 1024
                    ),
                ));
            }
        }

        if total > MAX_TOTAL_ANCILLARY {
            findings.push(self.finding(
                content,
                None,
                Severity::Medium,
                format!(
                    "ancillary payload is {} MiB (limit {} MiB)",
                    total / (1024 * 1024),
                    MAX_TOTAL_ANCILLARY / (1024 * 1024)
                ),
            ));
        }

        if content.ancillary.len() > MAX_ANCILLARY_COUNT {
            findings.push(self.finding(
                content,
                None,
                Severity::Low,
                format!(
                    "{} ancillary files (limit {})",
                    content.ancillary.len(),
                    MAX_ANCILLARY_COUNT
                ),
            ));
        }

        findings
    }
}
