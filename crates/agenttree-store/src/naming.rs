//! Deterministic resource naming and port allocation (spec §4.3). No
//! allocation: every name is computable from `(project, role, issue_id)`
//! alone, which is why an "active agent" is a derived view rather than a
//! persisted row (see `ActiveAgent` in the workflow crate).

const SLUG_NAME_CAP: usize = 30;

fn capped_slug(slug: &str) -> String {
    slug.chars().take(SLUG_NAME_CAP).collect()
}

pub fn container_name(project: &str, role: &str, padded_id: &str) -> String {
    format!("{project}-{role}-{padded_id}")
}

pub fn multiplexer_session_name(project: &str, role: &str, padded_id: &str) -> String {
    // Matches container name on purpose (spec §4.3).
    container_name(project, role, padded_id)
}

pub fn serve_session_name(project: &str, padded_id: &str) -> String {
    format!("{project}-serve-{padded_id}")
}

pub fn worktree_dir_name(padded_id: &str, slug: &str) -> String {
    format!("issue-{padded_id}-{}", capped_slug(slug))
}

pub fn branch_name(padded_id: &str, slug: &str) -> String {
    format!("issue-{padded_id}-{}", capped_slug(slug))
}

/// `base_port + (id mod 1000)` where base is the low end of the
/// configured port range.
pub fn deterministic_port(base_port: u16, issue_num: u32) -> u16 {
    base_port + (issue_num % 1000) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_and_session_names_match() {
        assert_eq!(
            container_name("agenttree", "developer", "007"),
            multiplexer_session_name("agenttree", "developer", "007")
        );
    }

    #[test]
    fn worktree_and_branch_names_match_and_cap_slug() {
        let long_slug = "a".repeat(60);
        let name = worktree_dir_name("001", &long_slug);
        assert_eq!(name, format!("issue-001-{}", "a".repeat(30)));
        assert_eq!(branch_name("001", &long_slug), name);
    }

    #[test]
    fn port_is_deterministic_from_id() {
        assert_eq!(deterministic_port(9000, 7), 9007);
        assert_eq!(deterministic_port(9000, 1007), 9007);
    }
}
