//! Outcome and risk classification.
//!
//! Every derived string here is a pure function of (report, mode) and part
//! of the stable machine-readable contract: identical inputs must yield
//! byte-identical values across versions.

use super::report::{SyncMode, SyncReport, risk_agent_name};

/// All derived classification fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub outcome: &'static str,
    pub progress_class: &'static str,
    pub progress_hotspot: Option<String>,
    pub progress_focus: Option<&'static str>,
    pub risk_class: &'static str,
    pub risk_level: &'static str,
    pub risk_hotspot: Option<String>,
    pub risk_agents: Vec<String>,
    pub next_action: &'static str,
    pub primary_action: &'static str,
    pub execution_priority: &'static str,
    pub follow_up_gate: &'static str,
    pub next_step_hint: String,
    pub recommended_command: String,
    pub recommended_commands: Vec<String>,
    pub recommended_agent: Option<String>,
    pub summary_line: String,
    pub noop_reason: Option<String>,
    pub strict_status: &'static str,
    pub strict_failure_reason: Option<&'static str>,
    pub next_batch_ready: bool,
    pub next_batch_blocker: Option<&'static str>,
    pub can_proceed: bool,
}

/// Classify a normalized report.
pub fn classify(report: &SyncReport, mode: SyncMode) -> Classification {
    let has_progress = report.has_progress();
    let has_risk = report.has_risk();

    let outcome = match (has_progress, has_risk) {
        (false, false) => "noop",
        (true, false) => "changed",
        (true, true) => "changed-with-risk",
        (false, true) => "blocked",
    };

    // Progress class by priority: upgrade > reinjection > source-refresh.
    let (progress_class, progress_hotspot) = if !report.upgraded_skills.is_empty() {
        ("upgrade", report.upgraded_skills.first().cloned())
    } else if !report.reinjected.is_empty() {
        ("reinjection", reinjection_hotspot(&report.reinjected))
    } else if !report.updated_sources.is_empty() {
        ("source-refresh", report.updated_sources.first().cloned())
    } else {
        ("none", None)
    };
    let progress_focus = match progress_class {
        "upgrade" => Some("skills"),
        "reinjection" => Some("agents"),
        "source-refresh" => Some("sources"),
        _ => None,
    };

    let risk_class = match (
        report.skipped_reinjects.is_empty(),
        report.failed_reinjects.is_empty(),
    ) {
        (true, true) => "none",
        (false, true) => "skipped-only",
        (true, false) => "failed-only",
        (false, false) => "mixed",
    };
    let risk_level = if !report.failed_reinjects.is_empty() {
        "high"
    } else if !report.skipped_reinjects.is_empty() {
        "medium"
    } else {
        "none"
    };

    // Lexicographically first risk item across both buckets.
    let risk_hotspot = report
        .skipped_reinjects
        .iter()
        .chain(report.failed_reinjects.iter())
        .min()
        .map(|item| risk_agent_name(item));

    let mut risk_agents: Vec<String> = report
        .skipped_reinjects
        .iter()
        .chain(report.failed_reinjects.iter())
        .map(|item| risk_agent_name(item))
        .collect();
    risk_agents.sort();
    risk_agents.dedup();

    let risk_inject_commands: Vec<String> = risk_agents
        .iter()
        .map(|agent| format!("skillpm inject --agent {agent} <skill-ref>"))
        .collect();

    let (next_action, primary_action) = if has_risk {
        ("clear-risk", "inject")
    } else if mode.dry_run && has_progress {
        ("apply-plan", "sync")
    } else if has_progress {
        ("review-sources", "source-list")
    } else {
        ("refresh-sources", "source-update")
    };

    let execution_priority = if !report.failed_reinjects.is_empty() {
        "high"
    } else if !report.skipped_reinjects.is_empty() {
        "medium"
    } else if has_progress {
        "low"
    } else {
        "none"
    };

    let follow_up_gate = if has_risk {
        "risk"
    } else if mode.dry_run && has_progress {
        "apply-pending"
    } else {
        "open"
    };

    let recommended_command = if has_risk {
        risk_inject_commands
            .first()
            .cloned()
            .unwrap_or_else(|| "skillpm sync".to_string())
    } else if mode.dry_run && has_progress {
        "skillpm sync".to_string()
    } else if has_progress {
        "skillpm source list".to_string()
    } else {
        "skillpm source update".to_string()
    };

    // Ordered, deduplicated, trimmed.
    let mut recommended_commands = vec![recommended_command.clone()];
    recommended_commands.extend(risk_inject_commands);
    let mut seen = std::collections::BTreeSet::new();
    recommended_commands.retain(|cmd| {
        let trimmed = cmd.trim().to_string();
        seen.insert(trimmed)
    });

    let next_step_hint = if has_risk {
        format!(
            "clear reinjection risk for agent {}, then re-run sync",
            risk_hotspot.as_deref().unwrap_or("unknown")
        )
    } else if mode.dry_run && has_progress {
        "apply the plan with skillpm sync".to_string()
    } else if has_progress {
        "review applied changes with skillpm source list".to_string()
    } else {
        "refresh sources with skillpm source update".to_string()
    };

    let summary_line = format!(
        "outcome={outcome} progress={} risk={} mode={}",
        report.progress_count(),
        report.risk_count(),
        mode.word()
    );

    let noop_reason = (outcome == "noop").then(|| {
        format!(
            "{} detected no source/upgrade/reinjection deltas",
            mode.word()
        )
    });

    let (strict_status, strict_failure_reason) = if !mode.strict {
        ("off", None)
    } else if !has_risk {
        ("passed", None)
    } else if !report.failed_reinjects.is_empty() {
        ("failed", Some("risk-present-failed"))
    } else {
        ("failed", Some("risk-present-skipped"))
    };

    let (next_batch_ready, next_batch_blocker) = if has_risk {
        (false, Some("risk-present"))
    } else if mode.dry_run {
        (false, Some("dry-run-mode"))
    } else {
        (true, None)
    };

    Classification {
        outcome,
        progress_class,
        progress_hotspot,
        progress_focus,
        risk_class,
        risk_level,
        recommended_agent: risk_hotspot.clone(),
        risk_hotspot,
        risk_agents,
        next_action,
        primary_action,
        execution_priority,
        follow_up_gate,
        next_step_hint,
        recommended_command,
        recommended_commands,
        summary_line,
        noop_reason,
        strict_status,
        strict_failure_reason,
        next_batch_ready,
        next_batch_blocker,
        can_proceed: !has_risk,
    }
}

/// Hotspot of the reinjection bucket: ties break by skill ref, then agent.
fn reinjection_hotspot(items: &[String]) -> Option<String> {
    items
        .iter()
        .min_by_key(|item| {
            match item.split_once(':') {
                Some((agent, skill_ref)) => (skill_ref.to_string(), agent.to_string()),
                None => (item.to_string(), String::new()),
            }
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(dry_run: bool, strict: bool) -> SyncMode {
        SyncMode { dry_run, strict }
    }

    #[test]
    fn noop_classification() {
        let report = SyncReport::default();
        let c = classify(&report, mode(true, false));
        assert_eq!(c.outcome, "noop");
        assert_eq!(c.progress_class, "none");
        assert_eq!(c.risk_class, "none");
        assert_eq!(
            c.noop_reason.as_deref(),
            Some("dry-run detected no source/upgrade/reinjection deltas")
        );
        assert_eq!(c.next_batch_blocker, Some("dry-run-mode"));
        assert!(!c.next_batch_ready);
        assert!(c.can_proceed);
    }

    #[test]
    fn upgrade_with_failed_reinject() {
        let report = SyncReport {
            updated_sources: vec!["local".to_string()],
            upgraded_skills: vec!["local/forms".to_string()],
            reinjected: vec![],
            skipped_reinjects: vec![],
            failed_reinjects: vec!["ghost: adapter not supported".to_string()],
        };
        let c = classify(&report, mode(true, false));
        assert_eq!(c.outcome, "changed-with-risk");
        assert_eq!(c.progress_class, "upgrade");
        assert_eq!(c.progress_hotspot.as_deref(), Some("local/forms"));
        assert_eq!(c.risk_class, "failed-only");
        assert_eq!(c.risk_level, "high");
        assert_eq!(c.risk_hotspot.as_deref(), Some("ghost"));
        assert_eq!(c.risk_agents, vec!["ghost"]);
        assert_eq!(
            c.recommended_command,
            "skillpm inject --agent ghost <skill-ref>"
        );
        assert_eq!(
            c.summary_line,
            "outcome=changed-with-risk progress=2 risk=1 mode=dry-run"
        );
        assert!(!c.can_proceed);
        assert_eq!(c.next_batch_blocker, Some("risk-present"));
    }

    #[test]
    fn changed_apply_is_ready() {
        let report = SyncReport {
            updated_sources: vec!["local".to_string()],
            upgraded_skills: vec!["local/forms".to_string()],
            ..Default::default()
        };
        let c = classify(&report, mode(false, false));
        assert_eq!(c.outcome, "changed");
        assert_eq!(c.risk_level, "none");
        assert_eq!(c.recommended_command, "skillpm source list");
        assert!(c.can_proceed);
        assert!(c.next_batch_ready);
        assert_eq!(c.next_batch_blocker, None);
    }

    #[test]
    fn strict_reason_prefers_failed() {
        let report = SyncReport {
            skipped_reinjects: vec!["cursor (agent home missing)".to_string()],
            failed_reinjects: vec!["ghost: boom".to_string()],
            ..Default::default()
        };
        let c = classify(&report, mode(true, true));
        assert_eq!(c.outcome, "blocked");
        assert_eq!(c.risk_class, "mixed");
        assert_eq!(c.strict_status, "failed");
        assert_eq!(c.strict_failure_reason, Some("risk-present-failed"));
    }

    #[test]
    fn skipped_only_is_medium() {
        let report = SyncReport {
            skipped_reinjects: vec!["cursor (agent home missing)".to_string()],
            ..Default::default()
        };
        let c = classify(&report, mode(false, true));
        assert_eq!(c.risk_level, "medium");
        assert_eq!(c.strict_failure_reason, Some("risk-present-skipped"));
        assert_eq!(c.execution_priority, "medium");
    }

    #[test]
    fn reinjection_hotspot_ties_by_ref_then_agent() {
        let report = SyncReport {
            reinjected: vec![
                "bravo:local/alpha".to_string(),
                "alpha:local/zulu".to_string(),
            ],
            ..Default::default()
        };
        let c = classify(&report, mode(false, false));
        assert_eq!(c.progress_class, "reinjection");
        // local/alpha sorts before local/zulu regardless of agent order.
        assert_eq!(c.progress_hotspot.as_deref(), Some("bravo:local/alpha"));
    }

    #[test]
    fn classification_is_deterministic() {
        let report = SyncReport {
            updated_sources: vec!["a".to_string(), "b".to_string()],
            upgraded_skills: vec!["a/x".to_string()],
            failed_reinjects: vec!["z: err".to_string()],
            ..Default::default()
        };
        let first = classify(&report, mode(true, true));
        let second = classify(&report, mode(true, true));
        assert_eq!(first, second);
    }
}
