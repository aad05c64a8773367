//! Hook executor (spec §4.6): the typed-operation set, host/container
//! gating, error taxonomy, and template rendering.

pub mod checks;
pub mod executor;
pub mod template;

pub use executor::{execute_hook_list, HookContext};
pub use template::issue_context_vars;

use agenttree_config::Hook;
use agenttree_core::Issue;

/// One hook's preview entry for `hooks check` (spec §11): the hook, its
/// position (`exit` vs `enter`), and whether it would be skipped by
/// host/container gating without actually running it.
pub struct HookPreview<'a> {
    pub phase: &'static str,
    pub hook: &'a Hook,
    pub would_skip: bool,
}

/// List the hooks that would run for `issue`'s current (exit) stage and
/// next (enter) stage, annotating host/container gating, without
/// executing any of them. Backs `agenttree hooks check <id>`.
pub fn preview_hooks<'a>(
    config: &'a agenttree_config::Config,
    issue: &Issue,
    next_dot_path: &str,
    in_container: bool,
) -> Vec<HookPreview<'a>> {
    let mut out = Vec::new();
    for hook in config.exit_hooks(&issue.dot_path()) {
        out.push(HookPreview { phase: "exit", hook, would_skip: hook.host_only() && in_container });
    }
    for hook in config.enter_hooks(next_dot_path) {
        out.push(HookPreview { phase: "enter", hook, would_skip: hook.host_only() && in_container });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_marks_host_only_hooks_skipped_in_container() {
        let yaml = r#"
project: demo
worktrees_dir: /tmp/w
port_range: "9000-9099"
flows:
  default: [implement, accepted]
stages:
  implement:
    role: developer
    pre_completion:
      - type: has_commits
  accepted:
    role: manager
    is_parking_lot: true
    post_start:
      - type: create_pr
roles:
  developer:
    container: true
    tool: claude
    model: sonnet
  manager:
    container: false
    tool: claude
    model: sonnet
"#;
        let config: agenttree_config::Config = serde_yaml::from_str(yaml).unwrap();
        let issue = agenttree_core::Issue {
            id: "001".into(),
            slug: "demo".into(),
            title: "Demo".into(),
            created: "2026-01-01T00:00:00Z".into(),
            updated: "2026-01-01T00:00:00Z".into(),
            flow: "default".into(),
            stage: "implement".into(),
            substage: None,
            branch: None,
            worktree_dir: None,
            labels: vec![],
            priority: agenttree_core::Priority::Medium,
            dependencies: vec![],
            github_issue: None,
            pr_number: None,
            pr_url: None,
            relevant_url: None,
            history: vec![],
            custom_agent_spawned: None,
            ci_escalated: false,
            processing: None,
            needs_push: false,
        };
        let previews = preview_hooks(&config, &issue, "accepted", true);
        let create_pr_preview = previews.iter().find(|p| p.hook.type_name() == "create_pr").unwrap();
        assert!(create_pr_preview.would_skip);
    }
}
