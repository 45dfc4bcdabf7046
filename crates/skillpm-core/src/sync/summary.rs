//! Versioned machine-readable sync summary.
//!
//! The `--json` contract consumed by CI gates. The key set is fixed:
//! scalars may be null, arrays are always present and sorted ascending,
//! `[]` never null. Legacy fields (`progressStatus`, `progressTarget`,
//! `progressSignal`, `riskStatus`, `riskBreakdown`) remain as additive
//! aliases of the newer classification fields.

use serde::Serialize;

use super::classify::{Classification, classify};
use super::report::{SyncMode, SyncReport};

pub const SCHEMA_VERSION: u32 = 1;

const TOP_SAMPLE_LIMIT: usize = 3;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub schema_version: u32,
    pub action_counts: ActionCounts,
    pub risk_counts: RiskCounts,
    pub outcome: String,
    pub progress_status: String,
    pub progress_class: String,
    pub progress_hotspot: Option<String>,
    pub progress_focus: Option<String>,
    pub progress_target: Option<String>,
    pub progress_signal: String,
    pub action_breakdown: String,
    pub next_action: String,
    pub primary_action: String,
    pub execution_priority: String,
    pub follow_up_gate: String,
    pub next_step_hint: String,
    pub recommended_command: String,
    pub recommended_commands: Vec<String>,
    pub recommended_agent: Option<String>,
    pub summary_line: String,
    pub noop_reason: Option<String>,
    pub risk_status: String,
    pub risk_level: String,
    pub risk_class: String,
    pub risk_breakdown: String,
    pub risk_inject_commands: Vec<String>,
    pub risk_hotspot: Option<String>,
    pub risk_agents: Vec<String>,
    pub risk_agents_total: usize,
    pub top_samples: TopSamples,
    pub dry_run: bool,
    pub strict_mode: bool,
    pub strict_status: String,
    pub strict_failure_reason: Option<String>,
    pub mode: String,
    pub has_progress: bool,
    pub has_risk: bool,
    pub can_proceed: bool,
    pub next_batch_ready: bool,
    pub next_batch_blocker: Option<String>,
    pub updated_sources: Vec<String>,
    pub upgraded_skills: Vec<String>,
    pub reinjected: Vec<String>,
    pub skipped_reinjects: Vec<String>,
    pub failed_reinjects: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ActionCounts {
    pub sources: usize,
    pub upgrades: usize,
    pub reinjected: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RiskCounts {
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TopSample {
    pub items: Vec<String>,
    pub remaining: usize,
}

impl TopSample {
    fn of(list: &[String]) -> Self {
        let items: Vec<String> = list.iter().take(TOP_SAMPLE_LIMIT).cloned().collect();
        Self {
            remaining: list.len().saturating_sub(items.len()),
            items,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TopSamples {
    pub sources: TopSample,
    pub upgrades: TopSample,
    pub reinjected: TopSample,
    pub skipped: TopSample,
    pub failed: TopSample,
}

/// Build the summary for a normalized report.
pub fn build_summary(report: &SyncReport, mode: SyncMode) -> SyncSummary {
    let c: Classification = classify(report, mode);

    let action_breakdown = format!(
        "sources={} upgrades={} reinjected={} skipped={} failed={}",
        report.updated_sources.len(),
        report.upgraded_skills.len(),
        report.reinjected.len(),
        report.skipped_reinjects.len(),
        report.failed_reinjects.len(),
    );
    let risk_breakdown = format!(
        "skipped={} failed={}",
        report.skipped_reinjects.len(),
        report.failed_reinjects.len()
    );

    let risk_inject_commands: Vec<String> = c
        .risk_agents
        .iter()
        .map(|agent| format!("skillpm inject --agent {agent} <skill-ref>"))
        .collect();

    SyncSummary {
        schema_version: SCHEMA_VERSION,
        action_counts: ActionCounts {
            sources: report.updated_sources.len(),
            upgrades: report.upgraded_skills.len(),
            reinjected: report.reinjected.len(),
        },
        risk_counts: RiskCounts {
            skipped: report.skipped_reinjects.len(),
            failed: report.failed_reinjects.len(),
        },
        outcome: c.outcome.to_string(),
        progress_status: if report.has_progress() { "progress" } else { "idle" }.to_string(),
        progress_class: c.progress_class.to_string(),
        progress_target: c.progress_hotspot.clone(),
        progress_hotspot: c.progress_hotspot,
        progress_focus: c.progress_focus.map(str::to_string),
        progress_signal: c.progress_class.to_string(),
        action_breakdown,
        next_action: c.next_action.to_string(),
        primary_action: c.primary_action.to_string(),
        execution_priority: c.execution_priority.to_string(),
        follow_up_gate: c.follow_up_gate.to_string(),
        next_step_hint: c.next_step_hint,
        recommended_command: c.recommended_command,
        recommended_commands: c.recommended_commands,
        recommended_agent: c.recommended_agent,
        summary_line: c.summary_line,
        noop_reason: c.noop_reason,
        risk_status: if report.has_risk() { "risk" } else { "ok" }.to_string(),
        risk_level: c.risk_level.to_string(),
        risk_class: c.risk_class.to_string(),
        risk_breakdown,
        risk_inject_commands,
        risk_hotspot: c.risk_hotspot,
        risk_agents_total: c.risk_agents.len(),
        risk_agents: c.risk_agents,
        top_samples: TopSamples {
            sources: TopSample::of(&report.updated_sources),
            upgrades: TopSample::of(&report.upgraded_skills),
            reinjected: TopSample::of(&report.reinjected),
            skipped: TopSample::of(&report.skipped_reinjects),
            failed: TopSample::of(&report.failed_reinjects),
        },
        dry_run: mode.dry_run,
        strict_mode: mode.strict,
        strict_status: c.strict_status.to_string(),
        strict_failure_reason: c.strict_failure_reason.map(str::to_string),
        mode: mode.word().to_string(),
        has_progress: report.has_progress(),
        has_risk: report.has_risk(),
        can_proceed: c.can_proceed,
        next_batch_ready: c.next_batch_ready,
        next_batch_blocker: c.next_batch_blocker.map(str::to_string),
        updated_sources: report.updated_sources.clone(),
        upgraded_skills: report.upgraded_skills.clone(),
        reinjected: report.reinjected.clone(),
        skipped_reinjects: report.skipped_reinjects.clone(),
        failed_reinjects: report.failed_reinjects.clone(),
    }
}
