//! Project context detection for scoring.
//!
//! Detects language markers, framework keywords, and branch-name task
//! signals from a project root.

use std::collections::BTreeSet;
use std::path::Path;

/// Detected project profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectProfile {
    pub project_type: Option<String>,
    pub frameworks: BTreeSet<String>,
    pub tasks: BTreeSet<String>,
}

/// (marker file, language, framework keywords to look for inside it)
const LANGUAGE_MARKERS: &[(&str, &str, &[&str])] = &[
    ("Cargo.toml", "rust", &["axum", "tokio", "actix", "rocket", "serde"]),
    (
        "package.json",
        "node",
        &["react", "vue", "next", "svelte", "express", "angular"],
    ),
    ("go.mod", "go", &["gin", "echo", "fiber", "chi"]),
    (
        "pyproject.toml",
        "python",
        &["django", "flask", "fastapi", "pytest", "numpy"],
    ),
    (
        "requirements.txt",
        "python",
        &["django", "flask", "fastapi", "pytest", "numpy"],
    ),
    ("pom.xml", "java", &["spring", "quarkus"]),
];

const TASK_SIGNALS: &[(&str, &str)] = &[
    ("fix", "fix"),
    ("bug", "fix"),
    ("hotfix", "fix"),
    ("feat", "feature"),
    ("feature", "feature"),
    ("refactor", "refactor"),
    ("test", "test"),
    ("docs", "docs"),
    ("doc", "docs"),
    ("perf", "perf"),
];

/// Detect the profile of a project root; `branch` contributes task
/// signals.
pub fn detect_profile(project_root: &Path, branch: Option<&str>) -> ProjectProfile {
    let mut profile = ProjectProfile::default();

    for (marker, language, keywords) in LANGUAGE_MARKERS {
        let path = project_root.join(marker);
        if !path.is_file() {
            continue;
        }
        if profile.project_type.is_none() {
            profile.project_type = Some((*language).to_string());
        }
        if let Ok(content) = std::fs::read_to_string(&path) {
            let lowered = content.to_lowercase();
            for keyword in *keywords {
                if lowered.contains(keyword) {
                    profile.frameworks.insert((*keyword).to_string());
                }
            }
        }
    }

    if let Some(branch) = branch {
        let lowered = branch.to_lowercase();
        for (token, task) in TASK_SIGNALS {
            let hit = lowered
                .split(['/', '-', '_', '.'])
                .any(|part| part == *token);
            if hit {
                profile.tasks.insert((*task).to_string());
            }
        }
    }

    profile
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn detects_rust_project_with_frameworks() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("Cargo.toml"),
            "[dependencies]\naxum = \"0.7\"\nserde = \"1\"\n",
        )
        .unwrap();

        let profile = detect_profile(tmp.path(), None);
        assert_eq!(profile.project_type.as_deref(), Some("rust"));
        assert!(profile.frameworks.contains("axum"));
        assert!(profile.frameworks.contains("serde"));
    }

    #[test]
    fn branch_names_contribute_task_signals() {
        let tmp = TempDir::new().unwrap();
        let profile = detect_profile(tmp.path(), Some("feat/forms-autofill"));
        assert!(profile.tasks.contains("feature"));

        let profile = detect_profile(tmp.path(), Some("fix_login_bug"));
        assert!(profile.tasks.contains("fix"));
    }

    #[test]
    fn empty_project_is_neutral() {
        let tmp = TempDir::new().unwrap();
        let profile = detect_profile(tmp.path(), None);
        assert_eq!(profile, ProjectProfile::default());
    }
}
