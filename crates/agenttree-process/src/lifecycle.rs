//! Agent lifecycle (spec §4.9): deterministic naming/ports, worktree +
//! branch + container + multiplexer session composition, and the
//! canonical stop that tears all four down in order.

use std::path::{Path, PathBuf};
use std::time::Duration;

use agenttree_core::{Error, Result};
use agenttree_store::{naming, state};
use tracing::{info, warn};

use crate::container::{self, Runtime};
use crate::multiplexer;
use crate::worktree;

pub struct StartOptions<'a> {
    pub project: &'a str,
    pub role: &'a str,
    pub issue_id: &'a str,
    pub slug: &'a str,
    pub repo_path: &'a Path,
    pub worktrees_dir: &'a Path,
    pub store_root: &'a Path,
    pub tool: &'a str,
    pub image: &'a str,
    pub base_port: u16,
    pub issue_num: u32,
    pub dangerous: bool,
    pub force: bool,
    pub oauth_token: Option<&'a str>,
    pub claude_config_dir: Option<&'a Path>,
    pub prompt_glyph: char,
    pub prompt_timeout: Duration,
}

pub struct StartedAgent {
    pub container_name: String,
    pub tmux_session: String,
    pub worktree_dir: PathBuf,
    pub branch: String,
    pub port: u16,
    pub has_merge_conflicts: bool,
}

/// `start_agent` minus preflight and the backlog-advance step, which the
/// workflow engine performs before calling in (both require config access
/// this crate doesn't have).
pub fn start_agent(opts: &StartOptions) -> Result<StartedAgent> {
    let _span = tracing::info_span!("agent_start", issue_id = %opts.issue_id, role = %opts.role).entered();

    let container_name = naming::container_name(opts.project, opts.role, opts.issue_id);
    let tmux_session = naming::multiplexer_session_name(opts.project, opts.role, opts.issue_id);
    let worktree_dir_name = naming::worktree_dir_name(opts.issue_id, opts.slug);
    let branch = naming::branch_name(opts.issue_id, opts.slug);
    let port = naming::deterministic_port(opts.base_port, opts.issue_num);
    let worktree_path = opts.worktrees_dir.join(&worktree_dir_name);

    if multiplexer::session_exists(&tmux_session) {
        if !opts.force {
            return Err(Error::already_running(opts.issue_id, opts.role));
        }
        stop_agent(&StopOptions {
            project: opts.project,
            role: opts.role,
            issue_id: opts.issue_id,
            store_root: opts.store_root,
        })?;
    }

    let mut has_merge_conflicts = false;
    if worktree_path.exists() {
        has_merge_conflicts = !worktree::update_worktree_with_main(&worktree_path)?;
    } else {
        worktree::create_worktree(opts.repo_path, &worktree_path, &branch)?;
    }

    let runtime = container::detect_runtime().ok_or_else(|| Error::PreflightError("no container runtime available".to_string()))?;

    let run_opts = container::RunCommandOptions {
        dangerous: opts.dangerous,
        image: opts.image,
        additional_args: vec![],
        port: Some(port),
        role: opts.role,
        issue_id: opts.issue_id,
        container_name: &container_name,
        claude_config_dir: opts.claude_config_dir,
        oauth_token: opts.oauth_token,
    };
    let run_cmd = container::build_run_command(runtime, &worktree_path, opts.tool, &run_opts);

    let start_command = run_cmd.join(" ");
    multiplexer::create_session(&tmux_session, &worktree_path, Some(&start_command))?;

    if !multiplexer::wait_for_prompt(&tmux_session, opts.prompt_glyph, opts.prompt_timeout, Duration::from_millis(500)) {
        warn!(session = %tmux_session, timeout = ?opts.prompt_timeout, "agent never reached a ready prompt, tearing down");
        let _ = multiplexer::kill_session(&tmux_session);
        let _ = container::remove_container(runtime, &container_name);
        return Err(Error::Fatal(format!("agent did not reach a ready prompt within {:?}", opts.prompt_timeout)));
    }

    if runtime.assigns_uuid_async() {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Ok(Some(id)) = container::find_by_worktree_mount(runtime, &worktree_path) {
                state::register_container(opts.store_root, opts.issue_id, opts.role, &id)?;
                info!(container_id = %id, "registered asynchronously-assigned container id");
                break;
            }
            if std::time::Instant::now() >= deadline {
                warn!(issue_id = %opts.issue_id, "gave up waiting for container runtime to assign a uuid");
                break;
            }
            std::thread::sleep(Duration::from_millis(250));
        }
    }

    info!(container = %container_name, session = %tmux_session, port, "agent started");
    Ok(StartedAgent { container_name, tmux_session, worktree_dir: worktree_path, branch, port, has_merge_conflicts })
}

pub struct StopOptions<'a> {
    pub project: &'a str,
    pub role: &'a str,
    pub issue_id: &'a str,
    pub store_root: &'a Path,
}

/// The only correct teardown path: kill the serve session, kill the
/// agent session, stop + remove the container, clear the state entry.
pub fn stop_agent(opts: &StopOptions) -> Result<()> {
    let _span = tracing::info_span!("agent_stop", issue_id = %opts.issue_id, role = %opts.role).entered();

    let serve_session = naming::serve_session_name(opts.project, opts.issue_id);
    multiplexer::kill_session(&serve_session)?;

    let tmux_session = naming::multiplexer_session_name(opts.project, opts.role, opts.issue_id);
    multiplexer::kill_session(&tmux_session)?;

    if let Some(runtime) = container::detect_runtime() {
        let container_ref = if runtime.assigns_uuid_async() {
            state::get_container(opts.store_root, opts.issue_id, opts.role)?
                .unwrap_or_else(|| naming::container_name(opts.project, opts.role, opts.issue_id))
        } else {
            naming::container_name(opts.project, opts.role, opts.issue_id)
        };
        let _ = container::stop_container(runtime, &container_ref);
        let _ = container::remove_container(runtime, &container_ref);
    }

    state::unregister(opts.store_root, opts.issue_id, opts.role)?;
    info!("agent stopped");
    Ok(())
}

/// Loops `stop_agent` over every role whose multiplexer session matches
/// this issue's ID suffix.
pub fn stop_all_agents_for_issue(project: &str, issue_id: &str, roles: &[String], store_root: &Path) -> Result<()> {
    for role in roles {
        let session = naming::multiplexer_session_name(project, role, issue_id);
        if multiplexer::session_exists(&session) {
            stop_agent(&StopOptions { project, role, issue_id, store_root })?;
        }
    }
    Ok(())
}
