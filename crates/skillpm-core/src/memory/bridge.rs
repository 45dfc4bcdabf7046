//! Memory bridge: export the score board into an external per-project
//! memory directory and read structured context signals back.
//!
//! Every exported file carries the managed marker; cleanup only removes
//! marker-bearing files.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, coded};
use crate::fsutil::{atomic_write_str, is_managed, managed_header};

use super::scoring::ScoreBoard;

const SCORES_FILENAME: &str = "skillpm-scores.md";
const RULES_FILENAME: &str = "skillpm-rules.md";
const MAIN_MEMORY_FILES: &[&str] = &["MEMORY.md", "memory.md", "AGENTS.md"];

/// Structured signals extracted from a project memory file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeSignals {
    pub package_manager: Option<String>,
    pub test_framework: Option<String>,
    pub frameworks: BTreeSet<String>,
    pub languages: BTreeSet<String>,
    pub preferences: Vec<String>,
}

/// Write the score board as a managed markdown file.
pub fn write_scores(board: &ScoreBoard, memory_dir: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(memory_dir)
        .map_err(|err| coded(ErrorCode::RulesMkdir, format!("{}: {err}", memory_dir.display())))?;

    let mut out = String::new();
    out.push_str(&managed_header("skillpm/scores", "sha256:-"));
    out.push_str("\n# Skill activation\n\n");
    out.push_str(&format!(
        "Captured {} | capacity {} | threshold {}\n\n",
        board.captured_at.format("%Y-%m-%dT%H:%M:%SZ"),
        board.capacity,
        board.threshold
    ));
    out.push_str("| skill | activation | working memory |\n|---|---|---|\n");
    for entry in &board.entries {
        out.push_str(&format!(
            "| {} | {:.3} | {} |\n",
            entry.skill_ref,
            entry.activation,
            if entry.in_working_memory { "yes" } else { "no" }
        ));
    }

    let path = memory_dir.join(SCORES_FILENAME);
    atomic_write_str(&path, &out)
        .map_err(|err| coded(ErrorCode::BridgeWrite, format!("{}: {err}", path.display())))?;
    Ok(path)
}

/// Write the working-memory rules file used by rules injection.
pub fn write_rules(board: &ScoreBoard, rules_dir: &Path, scope: &str) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(rules_dir)
        .map_err(|err| coded(ErrorCode::RulesMkdir, format!("{}: {err}", rules_dir.display())))?;

    let mut out = String::new();
    out.push_str(&managed_header("skillpm/rules", "sha256:-"));
    out.push_str(&format!(
        "\n# Active skills ({scope})\n\nGenerated {}.\n\n",
        Utc::now().format("%Y-%m-%d")
    ));
    for skill_ref in board.working_set() {
        out.push_str(&format!("- prefer skill `{skill_ref}` when relevant\n"));
    }

    let path = rules_dir.join(RULES_FILENAME);
    atomic_write_str(&path, &out)
        .map_err(|err| coded(ErrorCode::RulesWrite, format!("{}: {err}", path.display())))?;
    Ok(path)
}

/// Read the memory directory's main file and extract context signals.
/// Missing files yield empty signals.
pub fn read_signals(memory_dir: &Path) -> BridgeSignals {
    let mut signals = BridgeSignals::default();
    let Some(content) = MAIN_MEMORY_FILES
        .iter()
        .find_map(|name| std::fs::read_to_string(memory_dir.join(name)).ok())
    else {
        return signals;
    };

    for line in content.lines() {
        let lowered = line.trim().trim_start_matches('-').trim().to_lowercase();
        let Some((key, value)) = lowered.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.trim() {
            "package manager" | "package_manager" => {
                signals.package_manager = Some(value.to_string());
            }
            "test framework" | "test_framework" => {
                signals.test_framework = Some(value.to_string());
            }
            "frameworks" | "framework" => {
                signals
                    .frameworks
                    .extend(value.split(',').map(|v| v.trim().to_string()));
            }
            "languages" | "language" => {
                signals
                    .languages
                    .extend(value.split(',').map(|v| v.trim().to_string()));
            }
            "prefer" | "preference" => signals.preferences.push(value.to_string()),
            _ => {}
        }
    }
    signals
}

/// Remove bridge-managed files. User files, marker-less, survive.
pub fn cleanup(memory_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    let entries = match std::fs::read_dir(memory_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(removed),
        Err(err) => {
            return Err(coded(
                ErrorCode::RulesList,
                format!("{}: {err}", memory_dir.display()),
            ));
        }
    };
    for entry in entries {
        let entry = entry.map_err(|err| coded(ErrorCode::RulesList, err.to_string()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        if is_managed(&content) {
            std::fs::remove_file(&path)
                .map_err(|err| coded(ErrorCode::BridgeWrite, format!("{}: {err}", path.display())))?;
            removed.push(path);
        }
    }
    removed.sort();
    Ok(removed)
}
