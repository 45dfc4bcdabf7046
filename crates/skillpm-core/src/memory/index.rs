//! Skill index: leaf directory name to full skill ref.
//!
//! Transcript hits only carry the skill's directory name; the index maps
//! them back to installed refs. Unknown names are ignored by the caller.

use std::collections::BTreeMap;

use crate::store::InstalledState;

#[derive(Debug, Clone, Default)]
pub struct SkillIndex {
    by_leaf: BTreeMap<String, String>,
}

impl SkillIndex {
    pub fn from_state(state: &InstalledState) -> Self {
        let mut by_leaf = BTreeMap::new();
        for (key, installed) in &state.installed {
            // First ref wins on duplicate leaf names (BTreeMap order).
            by_leaf
                .entry(installed.slug.clone())
                .or_insert_with(|| key.clone());
        }
        Self { by_leaf }
    }

    pub fn lookup(&self, leaf: &str) -> Option<&str> {
        self.by_leaf.get(leaf).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_leaf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_leaf.is_empty()
    }
}
