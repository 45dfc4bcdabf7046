//! Memory pipeline: observation, scoring, feedback, consolidation, and
//! the optional bridge.
//!
//! Observation writes events; scoring reads events plus feedback;
//! consolidation reads both and writes scores; the bridge exports scores
//! to an external memory directory.

pub mod bridge;
pub mod consolidate;
pub mod context;
pub mod events;
pub mod feedback;
pub mod index;
pub mod observe;
pub mod parsers;
pub mod scan_state;
pub mod scoring;

use crate::config::Paths;
use crate::error::{ErrorCode, coded};

pub use consolidate::{ConsolidationReport, ConsolidationState, ConsolidationStore, consolidate};
pub use context::{ProjectProfile, detect_profile};
pub use events::{Event, EventContext, EventFilter, EventKind, EventLog, EventStats, event_id};
pub use feedback::{FeedbackKind, FeedbackLog, FeedbackSignal, infer_implicit};
pub use index::SkillIndex;
pub use observe::{ObserveSummary, Observer};
pub use parsers::{SessionHit, SessionParser, TranscriptFormat, builtin_parsers};
pub use scan_state::{FileScanState, ScanState, ScanStateStore};
pub use scoring::{ScoreBoard, ScoreEntry, ScoreStore, compute_scores};

/// Ensure the memory subtree exists under the state root.
pub fn init(paths: &Paths) -> anyhow::Result<()> {
    std::fs::create_dir_all(paths.memory_dir()).map_err(|err| {
        coded(
            ErrorCode::MemInit,
            format!("{}: {err}", paths.memory_dir().display()),
        )
    })
}
