//! Rollback engine (spec §4.11): archive post-target output files,
//! rewrite the issue back to an earlier stage, clear the session and PR
//! fields, unregister active agents, and optionally reset the worktree.

use std::collections::HashSet;
use std::path::Path;

use agenttree_config::{split_dot_path, Config};
use agenttree_core::{Error, Issue, Result};
use agenttree_process::{lifecycle, worktree};
use agenttree_store::{paths, session, IssueStore};

#[derive(Debug, Clone, Default)]
pub struct RollbackOptions {
    pub yes: bool,
    /// `None` defers to the default: reset when the target precedes
    /// `implement` in the flow.
    pub reset_worktree: Option<bool>,
    pub keep_changes: bool,
    pub skip_sync: bool,
    pub max_rollbacks: Option<u32>,
}

/// Roll `issue_id` back to `target` (spec §4.11 steps 1-6; step 6, the
/// sidecar commit/push, is the caller's job via `agenttree_sync::sync`
/// so this crate doesn't need a dependency on the sync loop).
pub fn rollback(
    config: &Config,
    store: &IssueStore,
    project: &str,
    roles: &[String],
    repo_path: &Path,
    issue_id: &str,
    target: &str,
    opts: &RollbackOptions,
) -> Result<Issue> {
    let issue = store.get(issue_id)?;

    let flow_stages = config.flow_stage_names(&issue.flow)?;
    let target_idx = flow_stages
        .iter()
        .position(|s| s == target)
        .ok_or_else(|| Error::validation(format!("'{target}' is not in flow '{}'", issue.flow)))?;
    let current_idx = flow_stages
        .iter()
        .position(|s| s == &issue.dot_path())
        .ok_or_else(|| Error::Fatal(format!("current stage '{}' not found in its own flow", issue.dot_path())))?;

    if target_idx >= current_idx {
        return Err(Error::validation(format!(
            "rollback target '{target}' must be strictly earlier than current stage '{}'",
            issue.dot_path()
        )));
    }
    if config.is_terminal(target) {
        return Err(Error::validation(format!("'{target}' is a terminal stage and cannot be a rollback target")));
    }
    if config.is_redirect_only(target) {
        return Err(Error::validation(format!("'{target}' is redirect-only and cannot be a rollback target")));
    }

    if let Some(max) = opts.max_rollbacks.or(config.rollback.max_rollbacks) {
        let count = issue
            .history
            .iter()
            .filter(|h| h.r#type == "rollback" && h.stage == split_dot_path(target).0)
            .count() as u32;
        if count >= max {
            return Err(Error::validation(format!(
                "rollback to '{target}' already performed {count} time(s), at the configured cap of {max}"
            )));
        }
    }

    let issue_dir = paths::issue_dir(store.root(), &issue.id, &issue.slug);
    archive_post_target_outputs(config, &issue_dir, flow_stages, target_idx)?;

    let (target_stage, target_substage) = split_dot_path(target);
    let mut rolled_back = store.update_stage(&issue.id, target_stage, target_substage.map(|s| s.to_string()), None, "rollback")?;
    rolled_back = store.update_metadata(&issue.id, |i| {
        i.pr_number = None;
        i.pr_url = None;
    })?;

    session::delete(store.root(), &issue.id)?;

    lifecycle::stop_all_agents_for_issue(project, &issue.id, roles, store.root())?;

    let should_reset = opts.reset_worktree.unwrap_or_else(|| {
        let implement_idx = flow_stages.iter().position(|s| s.starts_with("implement"));
        implement_idx.map(|i| target_idx < i).unwrap_or(true)
    });
    if should_reset && !opts.keep_changes {
        if let Some(dir) = &rolled_back.worktree_dir {
            worktree::reset_worktree(Path::new(dir), "main")?;
        }
    }

    Ok(rolled_back)
}

/// Move every existing output/review-doc file for stages strictly after
/// `target_idx` into `<issue>/archive/rollback_<timestamp>/`.
fn archive_post_target_outputs(config: &Config, issue_dir: &Path, flow_stages: &[String], target_idx: usize) -> Result<()> {
    let mut files: HashSet<String> = HashSet::new();
    for dot_path in flow_stages.iter().skip(target_idx + 1) {
        if let Some(output) = config.output_for(dot_path) {
            files.insert(output);
        }
        if let Some(review) = config.review_doc_for(dot_path) {
            files.insert(review);
        }
    }

    if files.is_empty() {
        return Ok(());
    }

    let any_exists = files.iter().any(|f| issue_dir.join(f).exists());
    if !any_exists {
        return Ok(());
    }

    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S").to_string();
    let archive_dir = issue_dir.join("archive").join(format!("rollback_{stamp}"));
    std::fs::create_dir_all(&archive_dir)?;

    for file in files {
        let src = issue_dir.join(&file);
        if src.exists() {
            std::fs::rename(&src, archive_dir.join(&file))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenttree_core::Priority;
    use tempfile::tempdir;

    fn sample_config() -> Config {
        let yaml = r#"
project: demo
worktrees_dir: /tmp/worktrees
port_range: "9000-9099"
flows:
  default: [explore, plan, implement, implement.review, accepted]
stages:
  explore:
    role: developer
    output: research.md
  plan:
    role: developer
    output: spec.md
  implement:
    role: developer
    output: code.md
    substages:
      review:
        output: review.md
  accepted:
    role: manager
    terminal: true
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
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn rollback_archives_later_stage_outputs_and_clears_pr() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("issues")).unwrap();
        let store = IssueStore::new(dir.path());
        let config = sample_config();

        let issue = store.create("Fix login", Priority::Medium, "default", "explore", None, vec![]).unwrap();
        let issue_dir = paths::issue_dir(store.root(), &issue.id, &issue.slug);
        std::fs::write(issue_dir.join("spec.md"), "spec").unwrap();
        std::fs::write(issue_dir.join("review.md"), "review").unwrap();
        store.update_stage(&issue.id, "implement", Some("review".to_string()), None, "transition").unwrap();
        store.update_metadata(&issue.id, |i| i.pr_number = Some(42)).unwrap();

        let roles = vec!["developer".to_string(), "manager".to_string()];
        let rolled_back = rollback(
            &config,
            &store,
            "demo",
            &roles,
            Path::new("/tmp/repo"),
            &issue.id,
            "explore",
            &RollbackOptions { skip_sync: true, ..Default::default() },
        )
        .unwrap();

        assert_eq!(rolled_back.stage, "explore");
        assert!(rolled_back.pr_number.is_none());
        assert!(!issue_dir.join("spec.md").exists());
        assert!(!issue_dir.join("review.md").exists());
    }

    #[test]
    fn rollback_rejects_target_at_or_after_current_stage() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("issues")).unwrap();
        let store = IssueStore::new(dir.path());
        let config = sample_config();
        let issue = store.create("Fix login", Priority::Medium, "default", "plan", None, vec![]).unwrap();

        let err = rollback(&config, &store, "demo", &[], Path::new("/tmp/repo"), &issue.id, "implement", &RollbackOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn rollback_rejects_terminal_target() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("issues")).unwrap();
        let store = IssueStore::new(dir.path());
        let config = sample_config();
        let issue = store.create("Fix login", Priority::Medium, "default", "accepted", None, vec![]).unwrap();

        let err = rollback(&config, &store, "demo", &[], Path::new("/tmp/repo"), &issue.id, "accepted", &RollbackOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }
}
