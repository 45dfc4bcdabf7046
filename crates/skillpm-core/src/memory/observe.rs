//! Incremental transcript observation.
//!
//! Tails heterogeneous agent session transcripts with persisted byte
//! offsets, falls back to an mtime scan of every agent's skills
//! directory, and appends deduplicated usage events to the event log.
//! Degrades gracefully: parse errors skip the file and preserve the
//! previous offset.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::debug;

use crate::adapter::AdapterRegistry;
use crate::error::{ErrorCode, coded};

use super::events::{Event, EventKind, EventLog, event_id};
use super::index::SkillIndex;
use super::parsers::{SessionParser, TranscriptFormat, builtin_parsers};
use super::scan_state::{FileScanState, ScanState, ScanStateStore};

const MTIME_CUTOFF_DAYS: i64 = 30;
const MAX_FILES_PER_PARSER: usize = 500;

/// Result of one observation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObserveSummary {
    pub files_parsed: usize,
    pub hits: usize,
    pub events_appended: usize,
}

pub struct Observer<'a> {
    home: PathBuf,
    event_log: Option<&'a EventLog>,
    scan_state: ScanStateStore,
    parsers: Vec<Box<dyn SessionParser>>,
    adapters: Option<&'a AdapterRegistry>,
    index: SkillIndex,
}

impl<'a> Observer<'a> {
    pub fn new(
        home: PathBuf,
        event_log: Option<&'a EventLog>,
        scan_state_path: PathBuf,
        adapters: Option<&'a AdapterRegistry>,
        index: SkillIndex,
    ) -> Self {
        Self {
            home,
            event_log,
            scan_state: ScanStateStore::new(scan_state_path),
            parsers: builtin_parsers(),
            adapters,
            index,
        }
    }

    /// Replace the parser set (tests).
    pub fn with_parsers(mut self, parsers: Vec<Box<dyn SessionParser>>) -> Self {
        self.parsers = parsers;
        self
    }

    /// Run one scan. A disabled observer (no event log) is a no-op.
    pub fn scan(&self, now: DateTime<Utc>) -> anyhow::Result<Option<ObserveSummary>> {
        let Some(event_log) = self.event_log else {
            return Ok(None);
        };

        let mut state = self.scan_state.load().unwrap_or_default();
        let mut summary = ObserveSummary::default();
        // (agent, session, skill_dir, kind) collected this pass.
        let mut hits: Vec<(String, super::parsers::SessionHit)> = Vec::new();

        for parser in &self.parsers {
            let mut files = self.candidate_files(parser.as_ref(), now);
            files.truncate(MAX_FILES_PER_PARSER);
            for (path, mtime) in files {
                match self.parse_file(parser.as_ref(), &path, mtime, now, &mut state) {
                    Ok(Some(parsed)) => {
                        summary.files_parsed += 1;
                        for hit in parsed {
                            hits.push((parser.agent().to_string(), hit));
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        // Graceful degradation: keep the old offset.
                        debug!(file = %path.display(), "transcript parse skipped: {err}");
                    }
                }
            }
        }

        // Mtime fallback for every agent with a skills directory.
        if let Some(adapters) = self.adapters {
            for adapter in adapters.iter() {
                let last_scan = state.agents.get(adapter.name()).copied();
                for hit in self.mtime_scan(adapter.skills_dir(), last_scan) {
                    hits.push((adapter.name().to_string(), hit));
                }
                state.agents.insert(adapter.name().to_string(), now);
            }
        }

        // Dedup on (session, skill dir, kind) and map through the index;
        // unknown skills are ignored.
        let mut seen = HashSet::new();
        let mut appended = 0usize;
        for (ordinal, (agent, hit)) in hits.iter().enumerate() {
            summary.hits += 1;
            if !seen.insert((hit.session_id.clone(), hit.skill_dir.clone(), hit.kind)) {
                continue;
            }
            let Some(skill_ref) = self.index.lookup(&hit.skill_dir) else {
                continue;
            };
            // Distinct nanosecond per event keeps the stable ids unique.
            let timestamp = now + Duration::nanoseconds(ordinal as i64);
            let event = Event {
                id: event_id(timestamp, agent, &hit.skill_dir),
                timestamp,
                skill_ref: skill_ref.to_string(),
                agent: agent.clone(),
                kind: hit.kind,
                scope: "observe".to_string(),
                context: None,
                fields: Default::default(),
            };
            event_log.append(&event)?;
            appended += 1;
        }
        summary.events_appended = appended;

        state.gc(now);
        self.scan_state
            .save(&state)
            .map_err(|err| coded(ErrorCode::MemObserveScan, err.to_string()))?;

        Ok(Some(summary))
    }

    /// Expand a parser's globs, drop files older than 30 days, sort
    /// newest first.
    fn candidate_files(
        &self,
        parser: &dyn SessionParser,
        now: DateTime<Utc>,
    ) -> Vec<(PathBuf, i64)> {
        let cutoff = now - Duration::days(MTIME_CUTOFF_DAYS);
        let mut files = Vec::new();
        for glob in parser.globs() {
            for path in expand_glob(&self.home, glob) {
                let Ok(metadata) = std::fs::metadata(&path) else {
                    continue;
                };
                let Some(mtime) = mtime_epoch(&metadata) else {
                    continue;
                };
                let mtime_utc = Utc
                    .timestamp_opt(mtime, 0)
                    .single()
                    .unwrap_or_else(Utc::now);
                if mtime_utc < cutoff {
                    continue;
                }
                files.push((path, mtime));
            }
        }
        files.sort_by_key(|(_, mtime)| std::cmp::Reverse(*mtime));
        files
    }

    /// Parse one file when its offset/mtime says there is new content.
    fn parse_file(
        &self,
        parser: &dyn SessionParser,
        path: &Path,
        mtime: i64,
        now: DateTime<Utc>,
        state: &mut ScanState,
    ) -> anyhow::Result<Option<Vec<super::parsers::SessionHit>>> {
        let key = path.to_string_lossy().to_string();
        let previous = state.files.get(&key).cloned();
        let size = std::fs::metadata(path)?.len();

        let slice = match parser.format() {
            TranscriptFormat::Jsonl => {
                let offset = previous.as_ref().map(|p| p.offset).unwrap_or(0);
                if size <= offset {
                    return Ok(None);
                }
                let bytes = std::fs::read(path)?;
                String::from_utf8_lossy(&bytes[offset as usize..]).to_string()
            }
            TranscriptFormat::Json => {
                if previous.as_ref().is_some_and(|p| p.mtime >= mtime) {
                    return Ok(None);
                }
                std::fs::read_to_string(path)?
            }
        };

        let hits = parser.parse(&slice)?;
        state.files.insert(
            key,
            FileScanState {
                offset: size,
                mtime,
                parsed_at: now,
                agent: parser.agent().to_string(),
            },
        );
        Ok(Some(hits))
    }

    /// Fallback scanner: skill directories touched since the last scan.
    fn mtime_scan(
        &self,
        skills_dir: PathBuf,
        last_scan: Option<DateTime<Utc>>,
    ) -> Vec<super::parsers::SessionHit> {
        let mut hits = Vec::new();
        let Ok(entries) = std::fs::read_dir(&skills_dir) else {
            return hits;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Ok(metadata) = std::fs::metadata(&path) else {
                continue;
            };
            let Some(mtime) = mtime_epoch(&metadata) else {
                continue;
            };
            let touched = Utc.timestamp_opt(mtime, 0).single();
            let is_new = match (touched, last_scan) {
                (Some(touched), Some(last)) => touched > last,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if is_new {
                hits.push(super::parsers::SessionHit {
                    session_id: "mtime-scan".to_string(),
                    skill_dir: entry.file_name().to_string_lossy().to_string(),
                    kind: EventKind::Access,
                });
            }
        }
        hits
    }
}

fn mtime_epoch(metadata: &std::fs::Metadata) -> Option<i64> {
    metadata
        .modified()
        .ok()?
        .duration_since(std::time::UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs() as i64)
}

/// Minimal glob expansion: `*` matches within one path segment.
pub fn expand_glob(base: &Path, pattern: &str) -> Vec<PathBuf> {
    let mut current = vec![base.to_path_buf()];
    for segment in pattern.split('/') {
        if segment.is_empty() {
            continue;
        }
        let mut next = Vec::new();
        if segment.contains('*') {
            let (prefix, suffix) = segment.split_once('*').unwrap_or((segment, ""));
            for dir in &current {
                let Ok(entries) = std::fs::read_dir(dir) else {
                    continue;
                };
                for entry in entries.flatten() {
                    let name = entry.file_name().to_string_lossy().to_string();
                    if name.starts_with(prefix) && name.ends_with(suffix) {
                        next.push(entry.path());
                    }
                }
            }
        } else {
            for dir in &current {
                let candidate = dir.join(segment);
                if candidate.exists() {
                    next.push(candidate);
                }
            }
        }
        current = next;
    }
    current.sort();
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::events::EventFilter;
    use crate::store::{InstalledSkill, InstalledState};
    use crate::types::{ContextAffinity, ModerationFlags, TrustTier};
    use tempfile::TempDir;

    fn state_with(slugs: &[&str]) -> InstalledState {
        let mut state = InstalledState::new();
        for slug in slugs {
            state.installed.insert(
                format!("local/{slug}"),
                InstalledSkill {
                    source: "local".to_string(),
                    slug: slug.to_string(),
                    version: "1.0.0".to_string(),
                    checksum: "sha256:00".to_string(),
                    source_ref: "loc@1.0.0".to_string(),
                    trust_tier: TrustTier::Trusted,
                    moderation: ModerationFlags::default(),
                    affinity: ContextAffinity::default(),
                    installed_at: Utc::now(),
                },
            );
        }
        state
    }

    fn write_transcript(home: &Path, rel: &str, content: &str) -> PathBuf {
        let path = home.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn disabled_observer_is_noop() {
        let tmp = TempDir::new().unwrap();
        let observer = Observer::new(
            tmp.path().to_path_buf(),
            None,
            tmp.path().join("scan_state.toml"),
            None,
            SkillIndex::default(),
        );
        assert_eq!(observer.scan(Utc::now()).unwrap(), None);
    }

    #[test]
    fn jsonl_tailing_only_reads_new_bytes() {
        let tmp = TempDir::new().unwrap();
        let home = tmp.path().join("home");
        let transcript = write_transcript(
            &home,
            ".claude/projects/p1/session.jsonl",
            "{\"sessionId\":\"s1\",\"m\":\"skills/forms\"}\n",
        );

        let log = EventLog::new(tmp.path().join("events.jsonl"));
        let index = SkillIndex::from_state(&state_with(&["forms"]));
        let observer = Observer::new(
            home.clone(),
            Some(&log),
            tmp.path().join("scan_state.toml"),
            None,
            index,
        );

        let first = observer.scan(Utc::now()).unwrap().unwrap();
        assert_eq!(first.events_appended, 1);

        // Nothing new: same offset, no events.
        let second = observer.scan(Utc::now()).unwrap().unwrap();
        assert_eq!(second.events_appended, 0);

        // Append a new session line; only the tail is parsed.
        let mut content = std::fs::read_to_string(&transcript).unwrap();
        content.push_str("{\"sessionId\":\"s2\",\"m\":\"skills/forms\"}\n");
        std::fs::write(&transcript, content).unwrap();

        let third = observer.scan(Utc::now()).unwrap().unwrap();
        assert_eq!(third.events_appended, 1);

        let events = log.query(&EventFilter::default()).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.skill_ref == "local/forms"));
    }

    #[test]
    fn unknown_skills_are_ignored() {
        let tmp = TempDir::new().unwrap();
        let home = tmp.path().join("home");
        write_transcript(
            &home,
            ".claude/projects/p1/session.jsonl",
            "{\"sessionId\":\"s1\",\"m\":\"skills/not-installed\"}\n",
        );

        let log = EventLog::new(tmp.path().join("events.jsonl"));
        let observer = Observer::new(
            home,
            Some(&log),
            tmp.path().join("scan_state.toml"),
            None,
            SkillIndex::from_state(&state_with(&["forms"])),
        );
        let summary = observer.scan(Utc::now()).unwrap().unwrap();
        assert_eq!(summary.hits, 1);
        assert_eq!(summary.events_appended, 0);
    }

    #[test]
    fn duplicate_hits_dedup_on_session_skill_kind() {
        let tmp = TempDir::new().unwrap();
        let home = tmp.path().join("home");
        write_transcript(
            &home,
            ".claude/projects/p1/session.jsonl",
            "{\"sessionId\":\"s1\",\"m\":\"skills/forms and again skills/forms\"}\n",
        );

        let log = EventLog::new(tmp.path().join("events.jsonl"));
        let observer = Observer::new(
            home,
            Some(&log),
            tmp.path().join("scan_state.toml"),
            None,
            SkillIndex::from_state(&state_with(&["forms"])),
        );
        let summary = observer.scan(Utc::now()).unwrap().unwrap();
        assert_eq!(summary.events_appended, 1);
    }

    #[test]
    fn glob_expansion_matches_wildcard_segments() {
        let tmp = TempDir::new().unwrap();
        let home = tmp.path();
        write_transcript(home, ".claude/projects/alpha/a.jsonl", "{}\n");
        write_transcript(home, ".claude/projects/beta/b.jsonl", "{}\n");
        write_transcript(home, ".claude/projects/beta/readme.md", "x");

        let matches = expand_glob(home, ".claude/projects/*/*.jsonl");
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().all(|p| p.extension().unwrap() == "jsonl"));
    }
}
