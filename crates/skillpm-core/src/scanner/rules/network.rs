//! Network indicator detection.

use std::collections::BTreeSet;

use regex::Regex;

use crate::scanner::{Finding, ScanRule, Severity, SkillContent};

use super::truncate;

const MAX_EXTERNAL_HOSTS: usize = 5;

const SHORTENERS: &[&str] = &[
    "bit.ly", "tinyurl.com", "t.co", "goo.gl", "is.gd", "ow.ly", "rb.gy", "cutt.ly",
];

pub struct NetworkIndicatorRule {
    ipv4: Regex,
    url: Regex,
}

impl NetworkIndicatorRule {
    pub fn new() -> Self {
        Self {
            ipv4: Regex::new(r"\b((25[0-5]|2[0-4]\d|1?\d?\d)\.){3}(25[0-5]|2[0-4]\d|1?\d?\d)\b")
                .expect("built-in scan pattern must compile"),
            url: Regex::new(r"https?://([A-Za-z0-9.-]+)(:(\d+))?")
                .expect("built-in scan pattern must compile"),
        }
    }

    fn finding(
        &self,
        content: &SkillContent<'_>,
        file: Option<&str>,
        line: Option<usize>,
        severity: Severity,
        pattern: Option<String>,
        message: String,
    ) -> Finding {
        Finding {
            rule: self.id().to_string(),
            severity,
            skill_ref: content.skill_ref.to_string(),
            file: file.map(str::to_string),
            line,
            pattern,
            message,
        }
    }
}

impl Default for NetworkIndicatorRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanRule for NetworkIndicatorRule {
    fn id(&self) -> &'static str {
        "network-indicator"
    }

    fn scan(&self, content: &SkillContent<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();
        let mut external_hosts = BTreeSet::new();

        for (file, text) in content.text_files() {
            for (idx, line) in text.lines().enumerate() {
                let line_no = Some(idx + 1);

                if let Some(ip) = self.ipv4.find(line) {
                    if !is_local_address(ip.as_str()) {
                        findings.push(self.finding(
                            content,
                            file,
                            line_no,
                            Severity::High,
                            Some(ip.as_str().to_string()),
                            "non-localhost IPv4 literal".to_string(),
                        ));
                    }
                }

                for captures in self.url.captures_iter(line) {
                    let host = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
                    let port = captures.get(3).and_then(|m| m.as_str().parse::<u16>().ok());

                    if !is_local_host(host) {
                        external_hosts.insert(host.to_lowercase());
                    }

                    if let Some(port) = port {
                        if port != 80 && port != 443 {
                            findings.push(self.finding(
                                content,
                                file,
                                line_no,
                                Severity::High,
                                Some(truncate(captures.get(0).unwrap().as_str(), 80)),
                                format!("non-standard port {port} in URL"),
                            ));
                        }
                    }

                    if SHORTENERS.iter().any(|s| host.eq_ignore_ascii_case(s)) {
                        findings.push(self.finding(
                            content,
                            file,
                            line_no,
                            Severity::Medium,
                            Some(host.to_string()),
                            "known URL shortener".to_string(),
                        ));
                    }
                }
            }
        }

        if external_hosts.len() > MAX_EXTERNAL_HOSTS {
            findings.push(self.finding(
                content,
                None,
                None,
                Severity::Medium,
                None,
                format!(
                    "{} unique external hostnames (limit {MAX_EXTERNAL_HOSTS})",
                    external_hosts.len()
                ),
            ));
        }

        findings
    }
}

fn is_local_address(ip: &str) -> bool {
    ip.starts_with("127.") || ip == "0.0.0.0"
}

fn is_local_host(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost") || is_local_address(host)
}
