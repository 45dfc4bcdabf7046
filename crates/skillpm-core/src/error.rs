//! Stable error taxonomy.
//!
//! Every user-visible failure carries a `CODE: message` prefix. Codes are
//! stable across versions; messages are not.

use thiserror::Error;

/// Stable error codes surfaced to users and CI gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Source management
    SrcAdd,
    SrcRemove,
    SrcUnreachable,
    SrcKind,
    // Resolution
    ResUnknownSource,
    ResUnknownSkill,
    ResNoVersion,
    ResRef,
    // Install pipeline
    InstallFetch,
    InstallChecksum,
    InstallStage,
    InstallCommit,
    InstallRollback,
    // Adapters
    AdpInject,
    AdpRemove,
    AdpNotSupported,
    AdpWrite,
    // Security
    SecTrustDeny,
    SecMalwareBlocked,
    SecSuspiciousConfirm,
    SecPathTraversal,
    SecSymlinkEscape,
    SecScanCritical,
    SecScanBlocked,
    // Sync / scheduling
    SyncRisk,
    SchIntervalConflict,
    SyncScheduleInterval,
    SyncScheduleBackend,
    // Memory
    MemEventlogAppend,
    MemEventlogQuery,
    MemFeedbackRate,
    MemFeedbackRange,
    MemFeedbackQuery,
    MemObserveScan,
    MemInit,
    MemConsolidateRun,
    // Rules bridge
    RulesMkdir,
    RulesList,
    RulesWrite,
    BridgeWrite,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::SrcAdd => "SRC_ADD",
            ErrorCode::SrcRemove => "SRC_REMOVE",
            ErrorCode::SrcUnreachable => "SRC_UNREACHABLE",
            ErrorCode::SrcKind => "SRC_KIND",
            ErrorCode::ResUnknownSource => "RES_UNKNOWN_SOURCE",
            ErrorCode::ResUnknownSkill => "RES_UNKNOWN_SKILL",
            ErrorCode::ResNoVersion => "RES_NO_VERSION",
            ErrorCode::ResRef => "RES_REF",
            ErrorCode::InstallFetch => "INSTALL_FETCH",
            ErrorCode::InstallChecksum => "INSTALL_CHECKSUM",
            ErrorCode::InstallStage => "INSTALL_STAGE",
            ErrorCode::InstallCommit => "INSTALL_COMMIT",
            ErrorCode::InstallRollback => "INSTALL_ROLLBACK",
            ErrorCode::AdpInject => "ADP_INJECT",
            ErrorCode::AdpRemove => "ADP_REMOVE",
            ErrorCode::AdpNotSupported => "ADP_NOT_SUPPORTED",
            ErrorCode::AdpWrite => "ADP_WRITE",
            ErrorCode::SecTrustDeny => "SEC_TRUST_DENY",
            ErrorCode::SecMalwareBlocked => "SEC_MALWARE_BLOCKED",
            ErrorCode::SecSuspiciousConfirm => "SEC_SUSPICIOUS_CONFIRM",
            ErrorCode::SecPathTraversal => "SEC_PATH_TRAVERSAL",
            ErrorCode::SecSymlinkEscape => "SEC_SYMLINK_ESCAPE",
            ErrorCode::SecScanCritical => "SEC_SCAN_CRITICAL",
            ErrorCode::SecScanBlocked => "SEC_SCAN_BLOCKED",
            ErrorCode::SyncRisk => "SYNC_RISK",
            ErrorCode::SchIntervalConflict => "SCH_INTERVAL_CONFLICT",
            ErrorCode::SyncScheduleInterval => "SYNC_SCHEDULE_INTERVAL",
            ErrorCode::SyncScheduleBackend => "SYNC_SCHEDULE_BACKEND",
            ErrorCode::MemEventlogAppend => "MEM_EVENTLOG_APPEND",
            ErrorCode::MemEventlogQuery => "MEM_EVENTLOG_QUERY",
            ErrorCode::MemFeedbackRate => "MEM_FEEDBACK_RATE",
            ErrorCode::MemFeedbackRange => "MEM_FEEDBACK_RANGE",
            ErrorCode::MemFeedbackQuery => "MEM_FEEDBACK_QUERY",
            ErrorCode::MemObserveScan => "MEM_OBSERVE_SCAN",
            ErrorCode::MemInit => "MEM_INIT",
            ErrorCode::MemConsolidateRun => "MEM_CONSOLIDATE_RUN",
            ErrorCode::RulesMkdir => "RULES_MKDIR",
            ErrorCode::RulesList => "RULES_LIST",
            ErrorCode::RulesWrite => "RULES_WRITE",
            ErrorCode::BridgeWrite => "BRIDGE_WRITE",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error with a stable code and an optional process exit code.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct CodedError {
    pub code: ErrorCode,
    pub message: String,
    pub exit_code: Option<i32>,
}

impl CodedError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            exit_code: None,
        }
    }

    /// Attach an explicit process exit code (overrides the default 1).
    pub fn with_exit(mut self, exit_code: i32) -> Self {
        self.exit_code = Some(exit_code);
        self
    }
}

/// Build an `anyhow::Error` carrying a stable code.
pub fn coded(code: ErrorCode, message: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(CodedError::new(code, message))
}

/// Look up the stable code attached to an error chain, if any.
pub fn code_of(err: &anyhow::Error) -> Option<ErrorCode> {
    err.chain()
        .find_map(|e| e.downcast_ref::<CodedError>())
        .map(|c| c.code)
}

/// Resolve the process exit code for an error. Defaults to 1 unless the
/// coded error carries an explicit override.
pub fn exit_code_of(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|e| e.downcast_ref::<CodedError>())
        .and_then(|c| c.exit_code)
        .unwrap_or(1)
}
