//! Dangerous shell pattern detection.

use crate::scanner::{Finding, ScanRule, Severity, SkillContent};

use super::{PatternSpec, scan_text_patterns};

pub struct DangerousPatternRule {
    patterns: Vec<PatternSpec>,
}

impl DangerousPatternRule {
    pub fn new() -> Self {
        Self {
            patterns: vec![
                PatternSpec::new(
                    r"rm\s+(-[a-zA-Z]*r[a-zA-Z]*f|-[a-zA-Z]*f[a-zA-Z]*r)\s+(/|~|\$HOME)",
                    Severity::Critical,
                    "destructive recursive delete of a root path",
                ),
                PatternSpec::new(
                    r"(curl|wget)[^|\n]*\|\s*(ba|z|da)?sh\b",
                    Severity::Critical,
                    "remote script piped directly into a shell",
                ),
                PatternSpec::new(
                    r"base64\s+(-d|-D|--decode)[^|\n]*\|\s*(ba|z|da)?sh\b",
                    Severity::Critical,
                    "obfuscated decoder piped into a shell",
                ),
                PatternSpec::new(
                    r"bash\s+-i\s*>?&?\s*/dev/tcp/",
                    Severity::Critical,
                    "reverse shell over /dev/tcp",
                ),
                PatternSpec::new(
                    r"\bnc(at)?\s+(-[a-zA-Z]*e\b|[^|\n]*\s-e\s)",
                    Severity::Critical,
                    "netcat with command execution",
                ),
                PatternSpec::new(
                    r"(curl|wget)[^\n]*(id_rsa|\.ssh/|\.aws/credentials|\.netrc)",
                    Severity::Critical,
                    "credential or SSH key exfiltration",
                ),
                PatternSpec::new(
                    r"(cat|less|head|cp|scp)\s+[^\n]*(~/\.ssh|\.aws/credentials|/etc/shadow|\.gnupg)",
                    Severity::High,
                    "reads a sensitive credential path",
                ),
                PatternSpec::new(
                    r"(xmrig|stratum\+tcp|minerd|cpuminer)",
                    Severity::High,
                    "crypto-mining marker",
                ),
                PatternSpec::new(
                    r"\b(pip3?|npm|cargo|gem|apt(-get)?|brew)\s+install\b",
                    Severity::Low,
                    "installs packages",
                ),
                PatternSpec::new(r"\bsudo\s+\S", Severity::Low, "uses sudo"),
            ],
        }
    }
}

impl Default for DangerousPatternRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanRule for DangerousPatternRule {
    fn id(&self) -> &'static str {
        "dangerous-pattern"
    }

    fn scan(&self, content: &SkillContent<'_>) -> Vec<Finding> {
        scan_text_patterns(self.id(), content, &self.patterns, false)
    }
}
