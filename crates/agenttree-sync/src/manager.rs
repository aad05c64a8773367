//! Manager hooks (spec §4.16): the periodic, idempotent scan a host-side
//! manager session runs between agent turns — stall detection, blocked-
//! dependency promotion, PR-merge detection, and custom-role spawning.

use chrono::{DateTime, Utc};

use agenttree_core::{Issue, Result};
use agenttree_process::{github, lifecycle};
use agenttree_workflow::{self as workflow, deps, engine, Environment};

const DEFAULT_ROLES: &[&str] = &["developer", "manager"];

#[derive(Debug, Clone)]
pub struct StalledIssue {
    pub issue_id: String,
    pub stage: String,
    pub minutes_since_update: i64,
}

/// (a) Any non-review-stage issue whose `updated` timestamp is older than
/// the configured threshold is reported as stalled. Purely a report: the
/// remedial action (nudge, restart, notify) is left to the caller.
pub fn detect_stalls(env: &Environment, now: DateTime<Utc>) -> Result<Vec<StalledIssue>> {
    let threshold = i64::from(env.config.manager.stall_threshold_min);
    let mut stalled = Vec::new();

    for issue in env.store.list(None, None)? {
        if env.config.is_human_review(&issue.dot_path()) || env.config.is_terminal(&issue.dot_path()) {
            continue;
        }
        let Ok(updated) = DateTime::parse_from_rfc3339(&issue.updated) else { continue };
        let minutes = (now - updated.with_timezone(&Utc)).num_minutes();
        if minutes >= threshold {
            stalled.push(StalledIssue { issue_id: issue.id.clone(), stage: issue.dot_path(), minutes_since_update: minutes });
        }
    }

    Ok(stalled)
}

/// (b) For every non-default-role stage with no live multiplexer session,
/// start one. Idempotent: `lifecycle::start_agent` itself refuses to
/// double-start a session unless `force` is set, so this never forces.
pub fn spawn_custom_role_agents(env: &Environment, base_port: u16, prompt_timeout: std::time::Duration) -> Result<Vec<String>> {
    let all_roles: Vec<String> = env.config.roles.keys().cloned().collect();
    let active = workflow::list_active_agents(env.project, &all_roles, env.store, base_port)?;
    let mut started = Vec::new();

    for issue in env.store.list(None, None)? {
        let Some(role) = env.config.role_for(&issue.dot_path()) else { continue };
        if DEFAULT_ROLES.contains(&role) {
            continue;
        }
        if active.iter().any(|a| a.issue_id == issue.id && a.role == role) {
            continue;
        }

        let req = workflow::StartRequest {
            issue_id: &issue.id,
            dangerous: false,
            force: false,
            skip_preflight: true,
            oauth_token: None,
            claude_config_dir: None,
            prompt_timeout,
        };
        match workflow::start_agent_for_issue(env, &req) {
            Ok(_) => {
                env.store.update_metadata(&issue.id, |i: &mut Issue| i.custom_agent_spawned = Some(issue.dot_path()))?;
                started.push(issue.id.clone());
            }
            Err(e) => tracing::warn!(issue = %issue.id, role = %role, error = %e, "custom-role agent spawn failed"),
        }
    }

    Ok(started)
}

/// Blocked-deps promotion: advance any backlog issue whose dependencies
/// just became satisfied.
pub fn promote_ready_backlog(env: &Environment, backlog_stage: &str, accepted_stage: &str) -> Result<Vec<String>> {
    let all = env.store.list(None, None)?;
    let ready_ids: Vec<String> = deps::ready_backlog_issues(&all, backlog_stage, accepted_stage).into_iter().map(|i| i.id.clone()).collect();

    let mut promoted = Vec::new();
    for issue_id in ready_ids {
        let req = engine::AdvanceRequest { issue_id: issue_id.clone(), target: None, trigger: engine::Trigger::Cli };
        match engine::advance(env, &req) {
            Ok(_) => promoted.push(issue_id),
            Err(e) => tracing::warn!(issue = %issue_id, error = %e, "blocked-deps promotion failed"),
        }
    }
    Ok(promoted)
}

/// (c) A stage is treated as PR-merge-triggered when it's the terminal or
/// parking-lot resting point after review and the issue already carries a
/// PR number. If that PR has since merged externally, advance the issue.
pub fn advance_merged_prs(env: &Environment) -> Result<Vec<String>> {
    let mut advanced = Vec::new();

    for issue in env.store.list(None, None)? {
        let dot_path = issue.dot_path();
        if !(env.config.is_terminal(&dot_path) || env.config.is_parking_lot(&dot_path)) {
            continue;
        }
        let Some(pr_number) = issue.pr_number else { continue };

        match github::is_pr_merged(env.repo_path, pr_number) {
            Ok(true) => {
                let req = engine::AdvanceRequest { issue_id: issue.id.clone(), target: None, trigger: engine::Trigger::Cli };
                match engine::advance(env, &req) {
                    Ok(_) => advanced.push(issue.id.clone()),
                    Err(e) => tracing::warn!(issue = %issue.id, error = %e, "advance after PR merge failed"),
                }
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(issue = %issue.id, error = %e, "PR-merged check failed"),
        }
    }

    Ok(advanced)
}

/// Tear down the multiplexer/container pair for any role whose session
/// has gone away on its own (crash recovery companion to `stop_agent`).
pub fn reconcile_state_file(env: &Environment, roles: &[String]) -> Result<()> {
    for issue in env.store.list(None, None)? {
        for role in roles {
            let session = agenttree_store::naming::multiplexer_session_name(env.project, role, &issue.id);
            if !agenttree_process::multiplexer::session_exists(&session) {
                if let Ok(Some(_)) = agenttree_store::state::get_container(env.store_root(), &issue.id, role) {
                    let _ = lifecycle::stop_agent(&lifecycle::StopOptions {
                        project: env.project,
                        role,
                        issue_id: &issue.id,
                        store_root: env.store_root(),
                    });
                }
            }
        }
    }
    Ok(())
}
