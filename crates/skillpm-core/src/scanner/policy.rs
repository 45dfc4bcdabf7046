//! Severity policy: decide whether a scan report blocks an install.

use crate::error::{ErrorCode, coded};

use super::{ScanReport, Severity};

/// Enforce the scan policy, in order:
///
/// 1. Any `critical` finding fails regardless of `force`.
/// 2. Any finding at or above `block_severity` fails without `force`.
/// 3. Any `medium` finding fails without `force`.
/// 4. Otherwise the report passes.
pub fn enforce(report: &ScanReport, block_severity: Severity, force: bool) -> anyhow::Result<()> {
    let Some(max) = report.max_severity() else {
        return Ok(());
    };

    if max >= Severity::Critical {
        return Err(coded(
            ErrorCode::SecScanCritical,
            format!(
                "{} critical finding(s); install is always blocked",
                count_at_least(report, Severity::Critical)
            ),
        ));
    }

    if max >= block_severity && !force {
        return Err(coded(
            ErrorCode::SecScanBlocked,
            format!(
                "{} finding(s) at or above {}; use --force to override",
                count_at_least(report, block_severity),
                block_severity.as_str()
            ),
        ));
    }

    if max >= Severity::Medium && !force {
        return Err(coded(
            ErrorCode::SecScanBlocked,
            format!(
                "{} medium-or-higher finding(s); use --force to override",
                count_at_least(report, Severity::Medium)
            ),
        ));
    }

    Ok(())
}

fn count_at_least(report: &ScanReport, severity: Severity) -> usize {
    report
        .findings
        .iter()
        .filter(|f| f.severity >= severity)
        .count()
}
