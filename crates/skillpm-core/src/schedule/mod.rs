//! Scheduler settings and the backend contract.
//!
//! Platform wrappers (launchd plists, systemd units) live outside the
//! core; this module validates intervals, resolves the scheduled
//! executable, and ships a file-backed backend driven by the
//! `SKILLPM_SCHEDULER_*` environment overrides for testability.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::config::Paths;
use crate::error::{ErrorCode, coded};
use crate::fsutil::atomic_write_str;

const MIN_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// One scheduled sync job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleJob {
    pub id: String,
    pub exec: PathBuf,
    pub interval: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Parse an interval like `30m`, `1h`, or `2d`. Rejects anything under
/// fifteen minutes.
pub fn parse_interval(raw: &str) -> anyhow::Result<Duration> {
    let raw = raw.trim();
    let (digits, unit) = raw.split_at(raw.len().saturating_sub(1));
    let value: u64 = digits.parse().map_err(|_| {
        coded(
            ErrorCode::SyncScheduleInterval,
            format!("unparseable interval: {raw:?}"),
        )
    })?;
    let duration = match unit {
        "m" => Duration::from_secs(value * 60),
        "h" => Duration::from_secs(value * 3600),
        "d" => Duration::from_secs(value * 86_400),
        _ => {
            return Err(coded(
                ErrorCode::SyncScheduleInterval,
                format!("unknown interval unit in {raw:?} (expected m|h|d)"),
            ));
        }
    };
    if duration < MIN_INTERVAL {
        return Err(coded(
            ErrorCode::SyncScheduleInterval,
            format!("interval {raw} is below the 15m minimum"),
        ));
    }
    Ok(duration)
}

/// Resolve the executable the scheduler should run.
/// `SKILLPM_SCHEDULER_EXEC` overrides the current binary.
pub fn scheduled_exec() -> anyhow::Result<PathBuf> {
    if let Some(exec) = std::env::var_os("SKILLPM_SCHEDULER_EXEC") {
        return Ok(PathBuf::from(exec));
    }
    std::env::current_exe().context("Failed to resolve current executable")
}

/// Backend contract for registering jobs with a platform scheduler.
pub trait SchedulerBackend {
    fn install(&self, job: &ScheduleJob) -> anyhow::Result<()>;
    fn list(&self) -> anyhow::Result<Vec<ScheduleJob>>;
    fn remove(&self, id: &str) -> anyhow::Result<()>;
}

/// File-backed backend: one TOML file per job under the scheduler root.
/// `SKILLPM_SCHEDULER_ROOT` overrides the location;
/// `SKILLPM_SCHEDULER_SKIP_COMMANDS` makes installs record-only.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn from_env(paths: &Paths) -> Self {
        let root = std::env::var_os("SKILLPM_SCHEDULER_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| paths.state_root().join("scheduler"));
        Self { root }
    }

    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn job_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.toml"))
    }
}

impl SchedulerBackend for FileBackend {
    fn install(&self, job: &ScheduleJob) -> anyhow::Result<()> {
        parse_interval(&job.interval)?;

        // Same id with a different interval is a conflict, not an update.
        if let Some(existing) = self.list()?.into_iter().find(|j| j.id == job.id) {
            if existing.interval != job.interval {
                return Err(coded(
                    ErrorCode::SchIntervalConflict,
                    format!(
                        "job {} already scheduled every {}; remove it before rescheduling",
                        job.id, existing.interval
                    ),
                ));
            }
        }

        let content = toml::to_string_pretty(job)
            .map_err(|err| coded(ErrorCode::SyncScheduleBackend, err.to_string()))?;
        atomic_write_str(&self.job_path(&job.id), &content)
            .map_err(|err| coded(ErrorCode::SyncScheduleBackend, err.to_string()))?;
        Ok(())
    }

    fn list(&self) -> anyhow::Result<Vec<ScheduleJob>> {
        let mut jobs = Vec::new();
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(jobs),
            Err(err) => {
                return Err(coded(ErrorCode::SyncScheduleBackend, err.to_string()));
            }
        };
        for entry in entries {
            let entry = entry.map_err(|err| coded(ErrorCode::SyncScheduleBackend, err.to_string()))?;
            if entry.path().extension().is_none_or(|ext| ext != "toml") {
                continue;
            }
            let content = std::fs::read_to_string(entry.path())
                .map_err(|err| coded(ErrorCode::SyncScheduleBackend, err.to_string()))?;
            if let Ok(job) = toml::from_str(&content) {
                jobs.push(job);
            }
        }
        jobs.sort_by(|a: &ScheduleJob, b: &ScheduleJob| a.id.cmp(&b.id));
        Ok(jobs)
    }

    fn remove(&self, id: &str) -> anyhow::Result<()> {
        let path = self.job_path(id);
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|err| coded(ErrorCode::SyncScheduleBackend, err.to_string()))?;
        }
        Ok(())
    }
}
