//! Hook declarations as parsed from `.agenttree.yaml` (spec §4.6).

use indexmap::IndexMap;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SectionExpect {
    NotEmpty,
    Empty,
    AllChecked,
}

/// A single hook declaration. `type` selects the variant; unknown types
/// are a hard config-load error (serde's internally-tagged enum rejects
/// them by construction).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Hook {
    Run {
        command: String,
        cwd: Option<String>,
        #[serde(default)]
        env: IndexMap<String, String>,
        #[serde(default)]
        optional: bool,
        #[serde(default)]
        host_only: bool,
        timeout_s: Option<u64>,
    },
    FileExists {
        file: String,
        #[serde(default)]
        optional: bool,
        #[serde(default)]
        host_only: bool,
        timeout_s: Option<u64>,
    },
    SectionCheck {
        file: String,
        section: String,
        expect: SectionExpect,
        #[serde(default)]
        optional: bool,
        #[serde(default)]
        host_only: bool,
        timeout_s: Option<u64>,
    },
    FieldCheck {
        file: String,
        path: String,
        min: f64,
        #[serde(default)]
        optional: bool,
        #[serde(default)]
        host_only: bool,
        timeout_s: Option<u64>,
    },
    CreateFile {
        template: String,
        dest: String,
        #[serde(default)]
        optional: bool,
        #[serde(default)]
        host_only: bool,
        timeout_s: Option<u64>,
    },
    HasCommits {
        #[serde(default)]
        optional: bool,
        #[serde(default)]
        host_only: bool,
        timeout_s: Option<u64>,
    },
    HasListItems {
        file: String,
        section: String,
        #[serde(default)]
        optional: bool,
        #[serde(default)]
        host_only: bool,
        timeout_s: Option<u64>,
    },
    PrApproved {
        #[serde(default)]
        skip_if_author: bool,
        #[serde(default)]
        optional: bool,
        #[serde(default)]
        host_only: bool,
        timeout_s: Option<u64>,
    },
    CreatePr {
        title: Option<String>,
        body: Option<String>,
        #[serde(default)]
        optional: bool,
        timeout_s: Option<u64>,
    },
    MergePr {
        #[serde(default)]
        optional: bool,
        timeout_s: Option<u64>,
    },
    CleanupAgent {
        #[serde(default)]
        optional: bool,
        timeout_s: Option<u64>,
    },
    StartBlockedIssues {
        #[serde(default)]
        optional: bool,
        timeout_s: Option<u64>,
    },
    Redirect {
        to: String,
        reason: String,
    },
    RebaseOntoMain {
        #[serde(default = "default_true")]
        optional: bool,
        #[serde(default)]
        host_only: bool,
        timeout_s: Option<u64>,
    },
}

fn default_true() -> bool {
    true
}

impl Hook {
    pub fn type_name(&self) -> &'static str {
        match self {
            Hook::Run { .. } => "run",
            Hook::FileExists { .. } => "file_exists",
            Hook::SectionCheck { .. } => "section_check",
            Hook::FieldCheck { .. } => "field_check",
            Hook::CreateFile { .. } => "create_file",
            Hook::HasCommits { .. } => "has_commits",
            Hook::HasListItems { .. } => "has_list_items",
            Hook::PrApproved { .. } => "pr_approved",
            Hook::CreatePr { .. } => "create_pr",
            Hook::MergePr { .. } => "merge_pr",
            Hook::CleanupAgent { .. } => "cleanup_agent",
            Hook::StartBlockedIssues { .. } => "start_blocked_issues",
            Hook::Redirect { .. } => "redirect",
            Hook::RebaseOntoMain { .. } => "rebase_onto_main",
        }
    }

    /// `create_pr`, `merge_pr`, `cleanup_agent`, and `start_blocked_issues`
    /// are implicitly host-only regardless of configuration, since they
    /// need credentials or side effects that make no sense from inside an
    /// agent's own container.
    pub fn host_only(&self) -> bool {
        match self {
            Hook::CreatePr { .. }
            | Hook::MergePr { .. }
            | Hook::CleanupAgent { .. }
            | Hook::StartBlockedIssues { .. } => true,
            Hook::Run { host_only, .. }
            | Hook::FileExists { host_only, .. }
            | Hook::SectionCheck { host_only, .. }
            | Hook::FieldCheck { host_only, .. }
            | Hook::CreateFile { host_only, .. }
            | Hook::HasCommits { host_only, .. }
            | Hook::HasListItems { host_only, .. }
            | Hook::PrApproved { host_only, .. }
            | Hook::RebaseOntoMain { host_only, .. } => *host_only,
            Hook::Redirect { .. } => false,
        }
    }

    pub fn optional(&self) -> bool {
        match self {
            Hook::Run { optional, .. }
            | Hook::FileExists { optional, .. }
            | Hook::SectionCheck { optional, .. }
            | Hook::FieldCheck { optional, .. }
            | Hook::CreateFile { optional, .. }
            | Hook::HasCommits { optional, .. }
            | Hook::HasListItems { optional, .. }
            | Hook::PrApproved { optional, .. }
            | Hook::CreatePr { optional, .. }
            | Hook::MergePr { optional, .. }
            | Hook::CleanupAgent { optional, .. }
            | Hook::StartBlockedIssues { optional, .. }
            | Hook::RebaseOntoMain { optional, .. } => *optional,
            Hook::Redirect { .. } => false,
        }
    }

    /// Default timeout is 30s for `run`, 5s for everything else that
    /// doesn't set its own `timeout_s`.
    pub fn timeout(&self) -> Duration {
        let configured = match self {
            Hook::Run { timeout_s, .. }
            | Hook::FileExists { timeout_s, .. }
            | Hook::SectionCheck { timeout_s, .. }
            | Hook::FieldCheck { timeout_s, .. }
            | Hook::CreateFile { timeout_s, .. }
            | Hook::HasCommits { timeout_s, .. }
            | Hook::HasListItems { timeout_s, .. }
            | Hook::PrApproved { timeout_s, .. }
            | Hook::CreatePr { timeout_s, .. }
            | Hook::MergePr { timeout_s, .. }
            | Hook::CleanupAgent { timeout_s, .. }
            | Hook::StartBlockedIssues { timeout_s, .. }
            | Hook::RebaseOntoMain { timeout_s, .. } => *timeout_s,
            Hook::Redirect { .. } => None,
        };
        match configured {
            Some(s) => Duration::from_secs(s),
            None if matches!(self, Hook::Run { .. }) => Duration::from_secs(30),
            None => Duration::from_secs(5),
        }
    }
}
