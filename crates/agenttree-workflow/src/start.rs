//! `start_agent_for_issue` (spec §4.9): the config-aware wrapper around
//! `agenttree_process::lifecycle::start_agent` that resolves role/tool/
//! image/model from config, runs preflight, and advances a still-backlog
//! issue into its flow's first stage before launching.

use std::time::Duration;

use agenttree_core::{Error, Result};
use agenttree_process::{lifecycle, preflight};

use crate::context::Environment;
use crate::engine::{self, AdvanceRequest, AdvanceOutcome, Trigger};

pub struct StartRequest<'a> {
    pub issue_id: &'a str,
    pub dangerous: bool,
    pub force: bool,
    pub skip_preflight: bool,
    pub oauth_token: Option<&'a str>,
    pub claude_config_dir: Option<&'a std::path::Path>,
    pub prompt_timeout: Duration,
}

pub struct StartResult {
    pub started: lifecycle::StartedAgent,
    pub role: String,
    pub issue_id: String,
}

/// Start (or resume) an agent session for `issue_id`. If the issue is
/// still parked at its flow's entry stage it is first advanced there
/// (spec §4.9 step 2); the subsequent transition's enter hooks run
/// exactly as they would for `next`.
pub fn start_agent_for_issue(env: &Environment, req: &StartRequest) -> Result<StartResult> {
    if !req.skip_preflight {
        let (ok, results) = preflight::check_all(env.repo_path);
        if !ok {
            let failures: Vec<String> = results.iter().filter(|r| r.required && !r.passed).map(|r| r.description.clone()).collect();
            return Err(Error::PreflightError(failures.join("; ")));
        }
    }

    let issue = env.store.get(req.issue_id)?;
    let flow_stages = env.config.flow_stage_names(&issue.flow)?;
    let entry_dot_path = flow_stages.first().ok_or_else(|| Error::Fatal(format!("flow '{}' has no stages", issue.flow)))?.clone();

    if issue.dot_path() == entry_dot_path && issue.history.len() <= 1 {
        let advance_req = AdvanceRequest { issue_id: issue.id.clone(), target: None, trigger: Trigger::Cli };
        match engine::advance(env, &advance_req) {
            Ok(AdvanceOutcome::Unchanged(_)) | Err(_) => {}
            Ok(_) => {}
        }
    }

    let issue = env.store.get(req.issue_id)?;
    let role = env
        .config
        .role_for(&issue.dot_path())
        .ok_or_else(|| Error::validation(format!("stage '{}' has no role", issue.dot_path())))?
        .to_string();
    let role_def = env
        .config
        .roles
        .get(&role)
        .ok_or_else(|| Error::Fatal(format!("role '{role}' referenced by stage but not defined")))?;

    let image = role_def.container.image().unwrap_or("agenttree-agent:latest").to_string();
    let (lo, _) = env.config.port_bounds()?;
    let issue_num: u32 = issue.id.parse().unwrap_or(0);
    let worktrees_dir = std::path::Path::new(&env.config.worktrees_dir);

    let opts = lifecycle::StartOptions {
        project: env.project,
        role: &role,
        issue_id: &issue.id,
        slug: &issue.slug,
        repo_path: env.repo_path,
        worktrees_dir,
        store_root: env.store_root(),
        tool: &role_def.tool,
        image: &image,
        base_port: lo,
        issue_num,
        dangerous: req.dangerous,
        force: req.force,
        oauth_token: req.oauth_token,
        claude_config_dir: req.claude_config_dir,
        prompt_glyph: env.config.manager.prompt_glyph,
        prompt_timeout: req.prompt_timeout,
    };

    let started = lifecycle::start_agent(&opts)?;

    env.store.update_metadata(&issue.id, |i| {
        i.branch = Some(started.branch.clone());
        i.worktree_dir = Some(started.worktree_dir.to_string_lossy().to_string());
    })?;

    if started.has_merge_conflicts {
        tracing::warn!(issue = %issue.id, "worktree rebase onto main hit conflicts; agent started anyway");
    }

    Ok(StartResult { started, role, issue_id: issue.id })
}
