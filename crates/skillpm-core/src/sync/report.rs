//! Sync report: the five disjoint action buckets.

/// Sync mode flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncMode {
    pub dry_run: bool,
    pub strict: bool,
}

impl SyncMode {
    pub fn word(&self) -> &'static str {
        if self.dry_run { "dry-run" } else { "apply" }
    }
}

/// One sync pass, bucketed. All lists are kept sorted ascending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Sources whose refresh observed a new revision marker.
    pub updated_sources: Vec<String>,
    /// Installed refs whose resolved version changed.
    pub upgraded_skills: Vec<String>,
    /// Successful agent materialization rewrites, as `agent:ref`.
    pub reinjected: Vec<String>,
    /// Agents not attempted, as `agent (reason)` display strings. Risk.
    pub skipped_reinjects: Vec<String>,
    /// Agents attempted but errored, as `agent: message`. Risk.
    pub failed_reinjects: Vec<String>,
}

impl SyncReport {
    pub fn progress_count(&self) -> usize {
        self.updated_sources.len() + self.upgraded_skills.len() + self.reinjected.len()
    }

    pub fn risk_count(&self) -> usize {
        self.skipped_reinjects.len() + self.failed_reinjects.len()
    }

    pub fn has_progress(&self) -> bool {
        self.progress_count() > 0
    }

    pub fn has_risk(&self) -> bool {
        self.risk_count() > 0
    }

    /// Sort every bucket ascending.
    pub fn normalize(&mut self) {
        self.updated_sources.sort();
        self.upgraded_skills.sort();
        self.reinjected.sort();
        self.skipped_reinjects.sort();
        self.failed_reinjects.sort();
    }
}

/// Parse the agent name out of a risk display string: everything before
/// the first `:` or ` (`, trimmed.
pub fn risk_agent_name(display: &str) -> String {
    let colon = display.find(':');
    let paren = display.find(" (");
    let cut = match (colon, paren) {
        (Some(c), Some(p)) => c.min(p),
        (Some(c), None) => c,
        (None, Some(p)) => p,
        (None, None) => display.len(),
    };
    display[..cut].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_agent_parsing() {
        assert_eq!(risk_agent_name("ghost: write failure"), "ghost");
        assert_eq!(risk_agent_name("cursor (agent home missing)"), "cursor");
        assert_eq!(risk_agent_name("plain"), "plain");
        assert_eq!(risk_agent_name("a: b (c)"), "a");
    }

    #[test]
    fn counts() {
        let mut report = SyncReport::default();
        report.updated_sources.push("local".to_string());
        report.upgraded_skills.push("local/forms".to_string());
        report.failed_reinjects.push("ghost: boom".to_string());
        assert_eq!(report.progress_count(), 2);
        assert_eq!(report.risk_count(), 1);
        assert!(report.has_progress());
        assert!(report.has_risk());
    }
}
