//! Encoded-blob and high-entropy text detection.

use regex::Regex;

use crate::scanner::{Finding, ScanRule, Severity, SkillContent};

use super::truncate;

const BASE64_RUN: usize = 500;
const HEX_RUN: usize = 200;
const ENTROPY_THRESHOLD: f64 = 5.5;
const ENTROPY_MIN_LINE_LEN: usize = 40;
const ENTROPY_LINE_COUNT: usize = 3;

pub struct EntropyRule {
    base64_run: Regex,
    hex_run: Regex,
}

impl EntropyRule {
    pub fn new() -> Self {
        Self {
            base64_run: Regex::new(&format!(r"[A-Za-z0-9+/]{{{BASE64_RUN},}}={{0,2}}"))
                .expect("built-in scan pattern must compile"),
            hex_run: Regex::new(&format!(r"[0-9a-fA-F]{{{HEX_RUN},}}"))
                .expect("built-in scan pattern must compile"),
        }
    }
}

impl Default for EntropyRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanRule for EntropyRule {
    fn id(&self) -> &'static str {
        "entropy"
    }

    fn scan(&self, content: &SkillContent<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for (file, text) in content.text_files() {
            let mut high_entropy_lines = 0usize;
            let mut first_high_entropy_line = None;

            for (idx, line) in text.lines().enumerate() {
                if let Some(matched) = self.base64_run.find(line) {
                    findings.push(Finding {
                        rule: self.id().to_string(),
                        severity: Severity::High,
                        skill_ref: content.skill_ref.to_string(),
                        file: file.map(str::to_string),
                        line: Some(idx + 1),
                        pattern: Some(truncate(matched.as_str(), 80)),
                        message: format!("base64 block of {}+ chars", BASE64_RUN),
                    });
                } else if let Some(matched) = self.hex_run.find(line) {
                    findings.push(Finding {
                        rule: self.id().to_string(),
                        severity: Severity::High,
                        skill_ref: content.skill_ref.to_string(),
                        file: file.map(str::to_string),
                        line: Some(idx + 1),
                        pattern: Some(truncate(matched.as_str(), 80)),
                        message: format!("hex block of {}+ chars", HEX_RUN),
                    });
                }

                if line.len() >= ENTROPY_MIN_LINE_LEN
                    && shannon_entropy(line) > ENTROPY_THRESHOLD
                {
                    high_entropy_lines += 1;
                    first_high_entropy_line.get_or_insert(idx + 1);
                }
            }

            if high_entropy_lines >= ENTROPY_LINE_COUNT {
                findings.push(Finding {
                    rule: self.id().to_string(),
                    severity: Severity::Medium,
                    skill_ref: content.skill_ref.to_string(),
                    file: file.map(str::to_string),
                    line: first_high_entropy_line,
                    pattern: None,
                    message: format!(
                        "{high_entropy_lines} lines over Shannon entropy {ENTROPY_THRESHOLD}"
                    ),
                });
            }
        }
        findings
    }
}

/// Shannon entropy in bits per character.
pub fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }
    let mut counts = std::collections::HashMap::new();
    let mut total = 0usize;
    for c in s.chars() {
        *counts.entry(c).or_insert(0usize) += 1;
        total += 1;
    }
    let total = total as f64;
    counts
        .values()
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn scan(primary: &str) -> Vec<Finding> {
        let ancillary = BTreeMap::new();
        EntropyRule::new().scan(&SkillContent {
            skill_ref: "local/forms",
            primary,
            ancillary: &ancillary,
        })
    }

    #[test]
    fn entropy_of_uniform_text_is_low() {
        assert!(shannon_entropy("aaaaaaaaaa") < 0.1);
        assert!(shannon_entropy("the quick brown fox") < 5.0);
    }

    #[test]
    fn long_base64_run_is_high() {
        let block = "QUJDRA".repeat(90);
        let findings = scan(&format!("data: {block}\n"));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::High);
        assert!(findings[0].message.contains("base64"));
    }

    #[test]
    fn long_hex_run_is_high() {
        let block = "deadbeef".repeat(30);
        let findings = scan(&format!("sig: {block}\n"));
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("hex"));
    }

    #[test]
    fn repeated_high_entropy_lines_are_medium() {
        // Pseudo-random strings exceed 5.5 bits/char with a wide alphabet.
        let line = "aB3$xQ9!mZ7@kL2#pW5^vN8&rT1*uY4(oI6)eH0_dF+cG-jS=qKzXwVbMnJhEoRlAyUtPi";
        let doc = format!("{line}\n{line}X\n{line}Y\n");
        let findings = scan(&doc);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Medium);
        assert_eq!(findings[0].line, Some(1));
    }

    #[test]
    fn two_high_entropy_lines_are_tolerated() {
        let line = "aB3$xQ9!mZ7@kL2#pW5^vN8&rT1*uY4(oI6)eH0_dF+cG-jS=qKzXwVbMnJhEoRlAyUtPi";
        let doc = format!("{line}\n{line}X\n");
        assert!(scan(&doc).is_empty());
    }
}
