//! Worktree manager (spec §4.10), ported from `original_source/agenttree/worktree.py`.

use std::path::Path;
use std::time::Duration;

use agenttree_core::{Error, Result};

use crate::exec;

const GIT_LOCAL_TIMEOUT: Duration = Duration::from_secs(10);
const GIT_NETWORK_TIMEOUT: Duration = Duration::from_secs(30);

const TASK_MARKER: &str = "TASK.md";

fn git(cwd: &Path, args: &[&str], timeout: Duration) -> Result<exec::Output> {
    exec::run("git", args, Some(cwd), timeout)
}

/// Busy if there's a leftover task marker, or uncommitted changes.
pub fn is_busy(worktree_path: &Path) -> bool {
    if worktree_path.join(TASK_MARKER).exists() {
        return true;
    }
    match git(worktree_path, &["status", "--porcelain"], GIT_LOCAL_TIMEOUT) {
        Ok(out) => !out.stdout.trim().is_empty(),
        Err(_) => false,
    }
}

/// `git branch <branch> HEAD` (exists-errors ignored), then
/// `git worktree add <path> <branch>`.
pub fn create_worktree(repo_path: &Path, worktree_path: &Path, branch: &str) -> Result<()> {
    let _ = git(repo_path, &["branch", branch, "HEAD"], GIT_LOCAL_TIMEOUT);

    if let Some(parent) = worktree_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let path_str = worktree_path.to_string_lossy().into_owned();
    let out = git(repo_path, &["worktree", "add", &path_str, branch], GIT_NETWORK_TIMEOUT)?;
    if out.status_success {
        Ok(())
    } else {
        Err(Error::Fatal(format!("git worktree add failed: {}", out.stderr.trim())))
    }
}

/// `git fetch origin`, `git rebase origin/main`. Returns `false` on
/// conflict without aborting the rebase — callers decide how to recover.
pub fn update_worktree_with_main(worktree_path: &Path) -> Result<bool> {
    let fetch = git(worktree_path, &["fetch", "origin"], GIT_NETWORK_TIMEOUT)?;
    if !fetch.status_success {
        return Err(Error::Transient(format!("git fetch failed: {}", fetch.stderr.trim())));
    }
    let rebase = git(worktree_path, &["rebase", "origin/main"], GIT_LOCAL_TIMEOUT)?;
    Ok(rebase.status_success)
}

pub fn remove_worktree(repo_path: &Path, worktree_path: &Path) -> Result<()> {
    let path_str = worktree_path.to_string_lossy().into_owned();
    let _ = git(repo_path, &["worktree", "remove", &path_str, "--force"], GIT_LOCAL_TIMEOUT);
    Ok(())
}

/// Fetch, checkout `base` (creating from `origin/<base>` if needed), hard
/// reset to `origin/<base>`, clean untracked, delete the task marker.
pub fn reset_worktree(worktree_path: &Path, base: &str) -> Result<()> {
    let fetch = git(worktree_path, &["fetch", "origin"], GIT_NETWORK_TIMEOUT)?;
    if !fetch.status_success {
        return Err(Error::Transient(format!("git fetch failed: {}", fetch.stderr.trim())));
    }

    let checkout = git(worktree_path, &["checkout", base], GIT_LOCAL_TIMEOUT)?;
    if !checkout.status_success {
        let remote_ref = format!("origin/{base}");
        let create = git(worktree_path, &["checkout", "-b", base, &remote_ref], GIT_LOCAL_TIMEOUT)?;
        if !create.status_success {
            return Err(Error::Fatal(format!("could not checkout or create '{base}': {}", create.stderr.trim())));
        }
    }

    let origin_ref = format!("origin/{base}");
    let reset = git(worktree_path, &["reset", "--hard", &origin_ref], GIT_LOCAL_TIMEOUT)?;
    if !reset.status_success {
        return Err(Error::Fatal(format!("git reset --hard failed: {}", reset.stderr.trim())));
    }

    git(worktree_path, &["clean", "-fd"], GIT_LOCAL_TIMEOUT)?;

    let marker = worktree_path.join(TASK_MARKER);
    if marker.exists() {
        std::fs::remove_file(marker)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn init_repo() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        git(dir.path(), &["init"], GIT_LOCAL_TIMEOUT).unwrap();
        git(dir.path(), &["config", "user.email", "test@example.com"], GIT_LOCAL_TIMEOUT).unwrap();
        git(dir.path(), &["config", "user.name", "Test"], GIT_LOCAL_TIMEOUT).unwrap();
        std::fs::write(dir.path().join("README.md"), "hello").unwrap();
        git(dir.path(), &["add", "-A"], GIT_LOCAL_TIMEOUT).unwrap();
        git(dir.path(), &["commit", "-m", "init"], GIT_LOCAL_TIMEOUT).unwrap();
        dir
    }

    #[test]
    fn is_busy_detects_task_marker() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(TASK_MARKER), "doing stuff").unwrap();
        assert!(is_busy(dir.path()));
    }

    #[test]
    fn is_busy_false_on_clean_tree_without_marker() {
        let dir = init_repo();
        assert!(!is_busy(dir.path()));
    }

    #[test]
    fn create_worktree_creates_branch_and_checkout() {
        let repo = init_repo();
        let worktree_parent = tempdir().unwrap();
        let worktree_path = worktree_parent.path().join("issue-001-demo");
        create_worktree(repo.path(), &worktree_path, "issue-001-demo").unwrap();
        assert!(worktree_path.join("README.md").exists());
    }
}
