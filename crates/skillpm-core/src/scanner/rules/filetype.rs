//! File-type detection over ancillary payloads.

use regex::Regex;

use crate::scanner::{Finding, ScanRule, Severity, SkillContent};

pub struct FileTypeRule {
    network_verbs: Regex,
}

const NATIVE_LIB_EXTENSIONS: &[&str] = &["so", "dylib", "dll"];
const EXECUTABLE_EXTENSIONS: &[&str] = &["exe", "bin", "com", "bat", "cmd", "ps1", "scr"];

impl FileTypeRule {
    pub fn new() -> Self {
        Self {
            network_verbs: Regex::new(r"\b(curl|wget|nc|ncat|ssh|scp|ftp)\b")
                .expect("built-in scan pattern must compile"),
        }
    }

    fn finding(
        &self,
        content: &SkillContent<'_>,
        file: &str,
        severity: Severity,
        message: String,
    ) -> Finding {
        Finding {
            rule: self.id().to_string(),
            severity,
            skill_ref: content.skill_ref.to_string(),
            file: Some(file.to_string()),
            line: None,
            pattern: None,
            message,
        }
    }
}

impl Default for FileTypeRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanRule for FileTypeRule {
    fn id(&self) -> &'static str {
        "file-type"
    }

    fn scan(&self, content: &SkillContent<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for (path, bytes) in content.ancillary {
            if let Some(kind) = binary_kind(bytes) {
                findings.push(self.finding(
                    content,
                    path,
                    Severity::High,
                    format!("compiled binary ({kind})"),
                ));
                continue;
            }

            let extension = path.rsplit('.').next().unwrap_or("").to_lowercase();
            if NATIVE_LIB_EXTENSIONS.contains(&extension.as_str()) {
                findings.push(self.finding(
                    content,
                    path,
                    Severity::High,
                    format!("native library extension .{extension}"),
                ));
                continue;
            }

            if is_shell_script(path, bytes) {
                if let Ok(text) = std::str::from_utf8(bytes) {
                    if self.network_verbs.is_match(text) {
                        findings.push(self.finding(
                            content,
                            path,
                            Severity::Medium,
                            "shell script with network verbs".to_string(),
                        ));
                        continue;
                    }
                }
            }

            if EXECUTABLE_EXTENSIONS.contains(&extension.as_str()) {
                findings.push(self.finding(
                    content,
                    path,
                    Severity::Low,
                    format!("unexpected executable extension .{extension}"),
                ));
            }
        }
        findings
    }
}

/// Classify well-known executable magic bytes.
fn binary_kind(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x7fELF") {
        return Some("ELF");
    }
    // Mach-O, 32/64 bit, both byte orders.
    const MACH_O: [[u8; 4]; 4] = [
        [0xFE, 0xED, 0xFA, 0xCE],
        [0xFE, 0xED, 0xFA, 0xCF],
        [0xCE, 0xFA, 0xED, 0xFE],
        [0xCF, 0xFA, 0xED, 0xFE],
    ];
    if MACH_O.iter().any(|magic| bytes.starts_with(magic)) {
        return Some("Mach-O");
    }
    if bytes.starts_with(b"MZ") {
        return Some("PE");
    }
    None
}

fn is_shell_script(path: &str, bytes: &[u8]) -> bool {
    if path.ends_with(".sh") || path.ends_with(".bash") {
        return true;
    }
    bytes.starts_with(b"#!") && {
        let head = String::from_utf8_lossy(&bytes[..bytes.len().min(64)]).to_lowercase();
        head.contains("sh")
    }
}
