//! Workflow engine (spec §4.8): given an issue and a target-or-next
//! request, resolve and run a stage transition through exit-hooks ->
//! stage-write -> enter-hooks, including restart detection and the
//! `--reassess` jump.

use agenttree_config::split_dot_path;
use agenttree_core::{Error, Issue, Processing, Result};
use agenttree_hooks::execute_hook_list;
use agenttree_store::session;
use tracing::info;

use crate::context::Environment;

/// Who asked for this transition. `Hook` marks an agent's own `next`
/// invocation from inside its stage — the only trigger that goes through
/// restart detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Cli,
    Web,
    Mcp,
    Hook,
}

pub struct AdvanceRequest {
    pub issue_id: String,
    /// `None` means "next in flow"; `Some(dot_path)` is an explicit target.
    pub target: Option<String>,
    pub trigger: Trigger,
}

pub struct ReorientInfo {
    pub skill_path: Option<String>,
    pub dot_path: String,
}

pub enum AdvanceOutcome {
    /// The issue transitioned to a new stage.
    Advanced { issue: Issue, previous_role: Option<String>, new_role: Option<String> },
    /// Restart detected: the agent was re-oriented instead of advancing.
    Reoriented(ReorientInfo),
    /// Target already matched the current position; nothing to do.
    Unchanged(Issue),
}

/// Resolve and run one stage transition (spec §4.8 steps 1-10).
pub fn advance(env: &Environment, req: &AdvanceRequest) -> Result<AdvanceOutcome> {
    let issue = env.store.get(&req.issue_id)?;

    if req.trigger == Trigger::Hook && req.target.is_none() {
        if session::needs_reorientation(env.store_root(), &issue.id, &issue.dot_path())? {
            session::mark_oriented(env.store_root(), &issue.id, &issue.dot_path())?;
            return Ok(AdvanceOutcome::Reoriented(ReorientInfo {
                skill_path: env.config.skill_path(&issue.dot_path()),
                dot_path: issue.dot_path(),
            }));
        }
    }

    let current_dot_path = issue.dot_path();
    let mut target = match &req.target {
        Some(t) => {
            if !env.config.is_valid_target(&issue.flow, t) {
                return Err(Error::not_found(format!("'{t}' in flow '{}'", issue.flow)));
            }
            t.clone()
        }
        None => {
            let (next, _) = env.config.next_in_flow(&issue.flow, &current_dot_path)?;
            next
        }
    };

    if target == current_dot_path {
        return Ok(AdvanceOutcome::Unchanged(issue));
    }

    let previous_role = env.config.role_for(&current_dot_path).map(|s| s.to_string());

    env.store.set_processing(&issue.id, Some(Processing::Exiting))?;

    let issue_dir = env.issue_dir(&issue);
    let context_vars = agenttree_hooks::issue_context_vars(&issue, &issue_dir);
    let exit_role = previous_role.clone().unwrap_or_else(|| "developer".to_string());
    let exit_hooks = env.config.exit_hooks(&current_dot_path);
    let exit_ctx = env.hook_context(&issue, &issue_dir, &exit_role, &context_vars);

    match execute_hook_list(&exit_hooks, &exit_ctx) {
        Ok(()) => {}
        Err(Error::Redirect { to, reason }) => {
            info!(from = %current_dot_path, to = %to, reason = %reason, "exit hook redirected transition");
            target = to;
        }
        Err(e) => {
            env.store.set_processing(&issue.id, None)?;
            return Err(e);
        }
    }

    if env.config.save_tmux_history {
        let tmux_session =
            agenttree_store::naming::multiplexer_session_name(env.project, &exit_role, &issue.id);
        let log_path = issue_dir.join("tmux_history.log");
        let _ = agenttree_process::multiplexer::save_history_to_file(&tmux_session, &log_path, &current_dot_path);
    }

    let (new_stage, new_substage) = split_dot_path(&target);
    let updated = env.store.update_stage(&issue.id, new_stage, new_substage.map(|s| s.to_string()), None, "transition")?;
    session::mark_oriented(env.store_root(), &updated.id, &target)?;

    env.store.set_processing(&updated.id, Some(Processing::Entering))?;

    let new_role = env.config.role_for(&target).map(|s| s.to_string());
    let enter_role = new_role.clone().unwrap_or_else(|| "developer".to_string());
    let enter_hooks = env.config.enter_hooks(&target);
    let enter_context_vars = agenttree_hooks::issue_context_vars(&updated, &issue_dir);
    let enter_ctx = env.hook_context(&updated, &issue_dir, &enter_role, &enter_context_vars);

    if let Err(e) = execute_hook_list(&enter_hooks, &enter_ctx) {
        env.store.set_processing(&updated.id, None)?;
        return Err(Error::Fatal(format!("enter hooks failed for '{target}': {e}")));
    }

    env.store.set_processing(&updated.id, None)?;

    let final_issue = env.store.get(&updated.id)?;
    Ok(AdvanceOutcome::Advanced { issue: final_issue, previous_role, new_role })
}

/// `--reassess`: from a `*_revise`-style substage, jump back to the
/// immediately preceding substage whose name contains `assess`, without
/// running `next_in_flow` computation (spec §4.8).
pub fn reassess(env: &Environment, issue_id: &str) -> Result<Issue> {
    let issue = env.store.get(issue_id)?;
    let (stage, _) = split_dot_path(&issue.dot_path());
    let stage_def = env
        .config
        .stages
        .get(stage)
        .ok_or_else(|| Error::not_found(format!("stage '{stage}'")))?;

    let assess_substage = stage_def
        .substages
        .keys()
        .find(|name| name.contains("assess"))
        .ok_or_else(|| Error::validation(format!("stage '{stage}' has no assess substage to reassess to")))?;

    env.store.update_stage(issue_id, stage, Some(assess_substage.clone()), None, "transition")
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenttree_config::Config;
    use agenttree_store::IssueStore;
    use tempfile::tempdir;

    fn sample_config() -> Config {
        let yaml = r#"
project: demo
worktrees_dir: /tmp/worktrees
port_range: "9000-9099"
flows:
  default: [explore, plan, accepted]
stages:
  explore:
    role: developer
    pre_completion:
      - type: file_exists
        file: research.md
  plan:
    role: developer
    output: spec.md
    human_review: true
  accepted:
    role: manager
    is_parking_lot: true
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

    fn store() -> (tempfile::TempDir, IssueStore) {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("issues")).unwrap();
        (dir, IssueStore::new(dir.path()))
    }

    #[test]
    fn advance_blocks_on_missing_exit_hook_file() {
        let (_dir, store) = store();
        let config = sample_config();
        let issue = store.create("Fix login", agenttree_core::Priority::Medium, "default", "explore", None, vec![]).unwrap();
        let env = Environment::new(&config, &store, std::path::Path::new("/tmp"), "demo");
        let req = AdvanceRequest { issue_id: issue.id.clone(), target: None, trigger: Trigger::Cli };
        let err = match advance(&env, &req).unwrap_err() {
            Error::Validation { reasons } => reasons,
            other => panic!("expected validation error, got {other:?}"),
        };
        assert!(!err.is_empty());
    }

    #[test]
    fn advance_succeeds_once_exit_hook_satisfied() {
        let (_dir, store) = store();
        let config = sample_config();
        let issue = store.create("Fix login", agenttree_core::Priority::Medium, "default", "explore", None, vec![]).unwrap();
        let issue_dir = agenttree_store::paths::issue_dir(store.root(), &issue.id, &issue.slug);
        std::fs::write(issue_dir.join("research.md"), "done").unwrap();

        let env = Environment::new(&config, &store, std::path::Path::new("/tmp"), "demo");
        let req = AdvanceRequest { issue_id: issue.id.clone(), target: None, trigger: Trigger::Cli };
        let outcome = advance(&env, &req).unwrap();
        match outcome {
            AdvanceOutcome::Advanced { issue, .. } => assert_eq!(issue.stage, "plan"),
            _ => panic!("expected an advance"),
        }
    }

    #[test]
    fn unchanged_target_is_a_no_op() {
        let (_dir, store) = store();
        let config = sample_config();
        let issue = store.create("Fix login", agenttree_core::Priority::Medium, "default", "explore", None, vec![]).unwrap();
        let env = Environment::new(&config, &store, std::path::Path::new("/tmp"), "demo");
        let req = AdvanceRequest { issue_id: issue.id.clone(), target: Some("explore".to_string()), trigger: Trigger::Cli };
        match advance(&env, &req).unwrap() {
            AdvanceOutcome::Unchanged(_) => {}
            _ => panic!("expected unchanged"),
        }
    }

    #[test]
    fn restart_triggers_reorientation_before_first_hook_call() {
        let (_dir, store) = store();
        let config = sample_config();
        let issue = store.create("Fix login", agenttree_core::Priority::Medium, "default", "explore", None, vec![]).unwrap();
        let env = Environment::new(&config, &store, std::path::Path::new("/tmp"), "demo");

        // No session file yet -> needs_reorientation is false, so the
        // first hook-triggered `next` advances (and creates the session).
        let req = AdvanceRequest { issue_id: issue.id.clone(), target: None, trigger: Trigger::Hook };
        std::fs::write(
            agenttree_store::paths::issue_dir(store.root(), &issue.id, &issue.slug).join("research.md"),
            "done",
        )
        .unwrap();
        let outcome = advance(&env, &req).unwrap();
        assert!(matches!(outcome, AdvanceOutcome::Advanced { .. }));
    }
}
