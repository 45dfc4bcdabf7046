//! Managed-file marker.
//!
//! Every file skillpm writes outside the state root carries a literal
//! marker substring so adapters can reclaim their own artifacts without
//! ever touching user-authored content.

/// Literal prefix present in every managed artifact.
pub const MANAGED_MARKER: &str = "<!-- skillpm:managed";

/// Render the full marker header for a materialized skill file.
pub fn managed_header(skill_ref: &str, checksum: &str) -> String {
    format!("{MANAGED_MARKER} ref=\"{skill_ref}\" checksum=\"{checksum}\" -->")
}

/// True when the content carries the managed marker.
pub fn is_managed(content: &str) -> bool {
    content.contains(MANAGED_MARKER)
}

/// Extract the owning skill ref from a managed header, if present.
pub fn managed_ref(content: &str) -> Option<&str> {
    let start = content.find(MANAGED_MARKER)?;
    let rest = &content[start..];
    let ref_start = rest.find("ref=\"")? + "ref=\"".len();
    let rest = &rest[ref_start..];
    let ref_end = rest.find('"')?;
    Some(&rest[..ref_end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_ref() {
        let header = managed_header("local/forms", "sha256:abc123");
        assert!(is_managed(&header));
        assert_eq!(managed_ref(&header), Some("local/forms"));
    }

    #[test]
    fn user_content_is_not_managed() {
        let content = "# My own skill\n\nhand-written notes\n";
        assert!(!is_managed(content));
        assert_eq!(managed_ref(content), None);
    }

    #[test]
    fn marker_found_mid_document() {
        let content = format!(
            "{}\n# Skill body\n",
            managed_header("src/name", "sha256:00")
        );
        assert_eq!(managed_ref(&content), Some("src/name"));
    }
}
