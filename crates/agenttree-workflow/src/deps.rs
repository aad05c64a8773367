//! Dependency graph queries (spec §2 component C): ready/blocked lookups
//! over the issue store. Cycle detection itself lives in
//! `agenttree_core::ids` since it's pure graph algorithm; this module is
//! the store-backed query layer the manager-hooks loop polls.

use agenttree_core::Issue;

/// True if every dependency of `issue` is itself an issue currently
/// sitting at `accepted_stage`.
pub fn is_ready(issue: &Issue, all: &[Issue], accepted_stage: &str) -> bool {
    issue
        .dependencies
        .iter()
        .all(|dep_id| all.iter().any(|candidate| candidate.id == *dep_id && candidate.stage == accepted_stage))
}

/// Issues sitting in `backlog_stage` whose dependencies are all satisfied
/// — candidates for the manager-hook's blocked-deps promotion (spec
/// §4.16b, end-to-end scenario 5).
pub fn ready_backlog_issues<'a>(all: &'a [Issue], backlog_stage: &str, accepted_stage: &str) -> Vec<&'a Issue> {
    all.iter().filter(|issue| issue.stage == backlog_stage && is_ready(issue, all, accepted_stage)).collect()
}

/// Issues in `backlog_stage` still missing at least one dependency.
pub fn blocked_backlog_issues<'a>(all: &'a [Issue], backlog_stage: &str, accepted_stage: &str) -> Vec<&'a Issue> {
    all.iter().filter(|issue| issue.stage == backlog_stage && !is_ready(issue, all, accepted_stage)).collect()
}
