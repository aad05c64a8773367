//! Hook executor (spec §4.6): dispatch, host/container gating, and
//! execution-order rules.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use agenttree_config::{CommandSpec, Hook};
use agenttree_core::{Error, Issue, Result};
use agenttree_process::{exec, github, lifecycle, worktree};
use agenttree_store::IssueStore;
use indexmap::IndexMap;
use tracing::{info, warn};

use crate::checks;
use crate::template;

pub struct HookContext<'a> {
    pub issue: &'a Issue,
    pub issue_dir: &'a Path,
    pub repo_path: &'a Path,
    pub store_root: &'a Path,
    pub templates_dir: &'a Path,
    pub commands: &'a IndexMap<String, CommandSpec>,
    pub project: &'a str,
    pub role: &'a str,
    pub in_container: bool,
    pub allow_self_approval: bool,
    pub context_vars: &'a HashMap<String, String>,
    /// Hooks that mutate issue metadata as a side effect (`create_pr`,
    /// `rebase_onto_main`'s `needs_push` flag) write through this store
    /// rather than returning values the caller must remember to persist.
    pub store: &'a IssueStore,
}

/// Run every exit hook in order. Substage list first, then stage list,
/// per §4.6. A `ValidationError` aborts the remainder; a `Redirect`
/// unwinds the whole call.
pub fn execute_hook_list(hooks: &[&Hook], ctx: &HookContext) -> Result<()> {
    for hook in hooks {
        execute_hook(hook, ctx)?;
    }
    Ok(())
}

fn execute_hook(hook: &Hook, ctx: &HookContext) -> Result<()> {
    if hook.host_only() && ctx.in_container {
        info!(hook_type = hook.type_name(), issue_id = %ctx.issue.id, "skipping host-only hook inside container");
        return Ok(());
    }

    let _span = tracing::info_span!("hook", hook_type = hook.type_name(), issue_id = %ctx.issue.id).entered();

    let result = dispatch(hook, ctx);

    match result {
        Ok(()) => Ok(()),
        Err(Error::Validation { reasons }) if hook.optional() => {
            warn!(reasons = ?reasons, "optional hook failed validation, continuing");
            Ok(())
        }
        other => other,
    }
}

fn dispatch(hook: &Hook, ctx: &HookContext) -> Result<()> {
    match hook {
        Hook::Run { command, cwd, env, .. } => run_command(command, cwd.as_deref(), env, ctx, hook.timeout()),
        Hook::FileExists { file, .. } => file_exists(file, ctx),
        Hook::SectionCheck { file, section, expect, .. } => section_check(file, section, *expect, ctx),
        Hook::FieldCheck { file, path, min, .. } => field_check(file, path, *min, ctx),
        Hook::CreateFile { template, dest, .. } => create_file(template, dest, ctx),
        Hook::HasCommits { .. } => has_commits(ctx),
        Hook::HasListItems { file, section, .. } => has_list_items(file, section, ctx),
        Hook::PrApproved { skip_if_author, .. } => pr_approved(*skip_if_author, ctx),
        Hook::CreatePr { title, body, .. } => create_pr(title.as_deref(), body.as_deref(), ctx),
        Hook::MergePr { .. } => merge_pr(ctx),
        Hook::CleanupAgent { .. } => cleanup_agent(ctx),
        Hook::StartBlockedIssues { .. } => start_blocked_issues(ctx),
        Hook::Redirect { to, reason } => Err(Error::redirect(to.clone(), reason.clone())),
        Hook::RebaseOntoMain { .. } => rebase_onto_main(ctx),
    }
}

fn run_command(command: &str, cwd: Option<&str>, env: &IndexMap<String, String>, ctx: &HookContext, timeout: std::time::Duration) -> Result<()> {
    let dir = cwd.map(PathBuf::from).unwrap_or_else(|| ctx.issue_dir.to_path_buf());
    if !env.is_empty() {
        // `exec::run` has no env-passing seam; shell-prefix the assignments
        // instead of widening that helper's signature for one caller.
        let prefix: String = env.iter().map(|(k, v)| format!("{k}={v} ")).collect();
        let full = format!("{prefix}{command}");
        let out = exec::run("sh", &["-c", &full], Some(&dir), timeout)?;
        return if out.status_success { Ok(()) } else { Err(Error::validation(out.stderr.trim().to_string())) };
    }
    let out = exec::run("sh", &["-c", command], Some(&dir), timeout)?;
    if out.status_success {
        Ok(())
    } else {
        Err(Error::validation(out.stderr.trim().to_string()))
    }
}

fn file_exists(file: &str, ctx: &HookContext) -> Result<()> {
    if ctx.issue_dir.join(file).exists() {
        Ok(())
    } else {
        Err(Error::validation(format!("expected file '{file}' to exist")))
    }
}

fn read_issue_file(file: &str, ctx: &HookContext) -> Result<String> {
    let path = ctx.issue_dir.join(file);
    std::fs::read_to_string(&path).map_err(|_| Error::validation(format!("could not read '{file}'")))
}

fn section_check(file: &str, section: &str, expect: agenttree_config::SectionExpect, ctx: &HookContext) -> Result<()> {
    let content = read_issue_file(file, ctx)?;
    if checks::check_section(&content, section, expect) {
        Ok(())
    } else {
        Err(Error::validation(format!("section '{section}' in '{file}' did not satisfy {expect:?}")))
    }
}

fn field_check(file: &str, path: &str, min: f64, ctx: &HookContext) -> Result<()> {
    let content = read_issue_file(file, ctx)?;
    match checks::field_at_least(&content, path, min) {
        Some(true) => Ok(()),
        Some(false) => Err(Error::validation(format!("'{path}' in '{file}' is below minimum {min}"))),
        None => Err(Error::validation(format!("could not locate numeric field '{path}' in '{file}'"))),
    }
}

fn has_list_items(file: &str, section: &str, ctx: &HookContext) -> Result<()> {
    let content = read_issue_file(file, ctx)?;
    if checks::list_item_count(&content, section) >= 1 {
        Ok(())
    } else {
        Err(Error::validation(format!("section '{section}' in '{file}' has no list items")))
    }
}

fn create_file(tmpl_name: &str, dest: &str, ctx: &HookContext) -> Result<()> {
    let dest_path = ctx.issue_dir.join(dest);
    if dest_path.exists() {
        return Ok(());
    }
    let tmpl_path = ctx.templates_dir.join(tmpl_name);
    let tmpl_text = std::fs::read_to_string(&tmpl_path).map_err(|_| Error::Fatal(format!("template '{tmpl_name}' missing")))?;
    let rendered = template::render(&tmpl_text, ctx.context_vars, ctx.commands, Some(ctx.issue_dir));
    if let Some(parent) = dest_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&dest_path, rendered)?;
    Ok(())
}

fn has_commits(ctx: &HookContext) -> Result<()> {
    let worktree_dir = ctx
        .issue
        .worktree_dir
        .as_deref()
        .ok_or_else(|| Error::validation("issue has no worktree"))?;
    let branch = ctx.issue.branch.as_deref().unwrap_or("");
    let out = exec::run(
        "git",
        &["log", &format!("origin/main..{branch}"), "--oneline"],
        Some(Path::new(worktree_dir)),
        std::time::Duration::from_secs(10),
    )?;
    if out.status_success && !out.stdout.trim().is_empty() {
        Ok(())
    } else {
        Err(Error::validation("no unpushed commits on issue branch"))
    }
}

fn pr_approved(skip_if_author: bool, ctx: &HookContext) -> Result<()> {
    let pr_number = ctx.issue.pr_number.ok_or_else(|| Error::validation("issue has no open PR"))?;
    let status = github::get_pr_approval_status(ctx.repo_path, pr_number)?;
    if status.approved {
        return Ok(());
    }
    if skip_if_author || ctx.allow_self_approval {
        return Ok(());
    }
    Err(Error::validation(format!("PR #{pr_number} is not yet approved")))
}

fn create_pr(title: Option<&str>, body: Option<&str>, ctx: &HookContext) -> Result<()> {
    let branch = ctx.issue.branch.as_deref().ok_or_else(|| Error::Fatal("issue has no branch".to_string()))?;
    let title = title.unwrap_or(&ctx.issue.title);
    let body = body.unwrap_or("");
    let (number, url) = github::create_pull_request(ctx.repo_path, branch, title, body)?;
    ctx.store.update_metadata(&ctx.issue.id, move |issue| {
        issue.pr_number = Some(number);
        issue.pr_url = Some(url);
    })?;
    Ok(())
}

fn merge_pr(ctx: &HookContext) -> Result<()> {
    let pr_number = ctx.issue.pr_number.ok_or_else(|| Error::Fatal("issue has no open PR".to_string()))?;
    github::merge_pr(ctx.repo_path, pr_number)
}

fn cleanup_agent(ctx: &HookContext) -> Result<()> {
    lifecycle::stop_agent(&lifecycle::StopOptions {
        project: ctx.project,
        role: ctx.role,
        issue_id: &ctx.issue.id,
        store_root: ctx.store_root,
    })
}

/// The actual backlog scan is owned by the manager-hooks loop (component
/// P), which has visibility over the whole issue store; this hook type
/// only marks the request so the caller can dispatch it there.
fn start_blocked_issues(_ctx: &HookContext) -> Result<()> {
    Ok(())
}

fn rebase_onto_main(ctx: &HookContext) -> Result<()> {
    let worktree_dir = ctx.issue.worktree_dir.as_deref().ok_or_else(|| Error::validation("issue has no worktree"))?;
    let ok = worktree::update_worktree_with_main(Path::new(worktree_dir))?;
    if ok {
        Ok(())
    } else {
        ctx.store.update_metadata(&ctx.issue.id, |issue| issue.needs_push = true)?;
        Err(Error::redirect("debug", "rebase onto main produced conflicts"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenttree_core::Priority;
    use tempfile::tempdir;

    fn sample_issue() -> Issue {
        Issue {
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
            priority: Priority::Medium,
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
        }
    }

    #[test]
    fn file_exists_hook_validates_presence() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("problem.md"), "content").unwrap();
        let issue = sample_issue();
        let commands = IndexMap::new();
        let ctx_vars = HashMap::new();
        let store = agenttree_store::IssueStore::new(dir.path());
        let ctx = HookContext {
            issue: &issue,
            issue_dir: dir.path(),
            repo_path: dir.path(),
            store_root: dir.path(),
            templates_dir: dir.path(),
            commands: &commands,
            project: "agenttree",
            role: "developer",
            in_container: false,
            allow_self_approval: false,
            context_vars: &ctx_vars,
            store: &store,
        };
        assert!(file_exists("problem.md", &ctx).is_ok());
        assert!(file_exists("missing.md", &ctx).is_err());
    }

    #[test]
    fn host_only_hook_skipped_in_container() {
        let dir = tempdir().unwrap();
        let issue = sample_issue();
        let commands = IndexMap::new();
        let ctx_vars = HashMap::new();
        let store = agenttree_store::IssueStore::new(dir.path());
        let ctx = HookContext {
            issue: &issue,
            issue_dir: dir.path(),
            repo_path: dir.path(),
            store_root: dir.path(),
            templates_dir: dir.path(),
            commands: &commands,
            project: "agenttree",
            role: "developer",
            in_container: true,
            allow_self_approval: false,
            context_vars: &ctx_vars,
            store: &store,
        };
        let hook = Hook::MergePr { optional: false, timeout_s: None };
        assert!(execute_hook(&hook, &ctx).is_ok());
    }
}
