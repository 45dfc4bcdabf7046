//! Built-in adapter registry.
//!
//! One adapter per supported agent, registered in lexicographic order; the
//! sync engine and installer walk the list in that order.

use std::path::Path;

use super::{Adapter, DirAdapter};

/// Ordered adapter registry.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn Adapter>>,
}

impl AdapterRegistry {
    /// Registry with every built-in agent rooted under `home`.
    pub fn builtin(home: &Path) -> Self {
        let adapters: Vec<Box<dyn Adapter>> = vec![
            Box::new(DirAdapter::new("antigravity", home.join(".antigravity/skills"))),
            Box::new(DirAdapter::new("claude", home.join(".claude/skills"))),
            Box::new(DirAdapter::new("codex", home.join(".codex/skills"))),
            Box::new(DirAdapter::new("copilot", home.join(".copilot/skills"))),
            Box::new(DirAdapter::new("cursor", home.join(".cursor/skills"))),
            Box::new(DirAdapter::new("gemini", home.join(".gemini/skills"))),
            Box::new(DirAdapter::new("kiro", home.join(".kiro/skills"))),
            Box::new(DirAdapter::new("opencode", home.join(".config/opencode/skills"))),
            Box::new(DirAdapter::new("openclaw", home.join(".openclaw/skills"))),
            Box::new(DirAdapter::new("trae", home.join(".trae/skills"))),
        ];
        Self { adapters }
    }

    /// Registry over explicit adapters (tests, embedders).
    pub fn new(adapters: Vec<Box<dyn Adapter>>) -> Self {
        Self { adapters }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Adapter> {
        self.adapters
            .iter()
            .find(|a| a.name() == name)
            .map(|a| a.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Adapter> {
        self.adapters.iter().map(|a| a.as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn builtin_registry_is_ordered_and_complete() {
        let tmp = TempDir::new().unwrap();
        let registry = AdapterRegistry::builtin(tmp.path());
        let names = registry.names();
        assert_eq!(
            names,
            vec![
                "antigravity",
                "claude",
                "codex",
                "copilot",
                "cursor",
                "gemini",
                "kiro",
                "opencode",
                "openclaw",
                "trae",
            ]
        );
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn lookup_by_name() {
        let tmp = TempDir::new().unwrap();
        let registry = AdapterRegistry::builtin(tmp.path());
        assert!(registry.get("claude").is_some());
        assert!(registry.get("ghost").is_none());
        assert_eq!(
            registry.get("claude").unwrap().skills_dir(),
            tmp.path().join(".claude/skills")
        );
    }
}
