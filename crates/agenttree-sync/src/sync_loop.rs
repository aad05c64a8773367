//! Sidecar sync loop (spec §4.15): the issue store lives in its own git
//! repo, kept consistent with its remote on a best-effort basis. Network
//! failures degrade to "stay offline, keep working" rather than erroring
//! the caller — the whole point is agents keep making progress without a
//! remote.

use std::path::Path;
use std::time::Duration;

use agenttree_config::Config;
use agenttree_core::{Issue, Result};
use agenttree_process::{detect, exec, github};
use agenttree_store::IssueStore;

const LOCAL_TIMEOUT: Duration = Duration::from_secs(10);
const NETWORK_TIMEOUT: Duration = Duration::from_secs(30);

fn git(cwd: &Path, args: &[&str], timeout: Duration) -> Result<exec::Output> {
    exec::run("git", args, Some(cwd), timeout)
}

/// Commit any pending changes to the store, pull --rebase, optionally
/// push, then run the push-pending-branches / check-pending-PRs
/// post-actions. Returns `false` whenever the loop stopped early for a
/// benign reason (in a container, no `.git`, offline, conflict).
pub fn sync(config: &Config, store: &IssueStore, repo_path: &Path, pull_only: bool, commit_message: Option<&str>) -> Result<bool> {
    if detect::running_in_container() {
        return Ok(false);
    }

    let store_path = store.root();
    if !store_path.join(".git").exists() {
        return Ok(false);
    }

    let add = git(store_path, &["add", "-A"], LOCAL_TIMEOUT)?;
    if !add.status_success {
        tracing::warn!(stderr = %add.stderr.trim(), "git add -A failed during sync");
    }

    let status = git(store_path, &["status", "--porcelain"], LOCAL_TIMEOUT)?;
    if !status.stdout.trim().is_empty() {
        let message = commit_message.unwrap_or("agenttree: sync issue store");
        let commit = git(store_path, &["commit", "-m", message], LOCAL_TIMEOUT)?;
        if !commit.status_success {
            tracing::warn!(stderr = %commit.stderr.trim(), "git commit failed during sync");
        }
    }

    let pull = git(store_path, &["pull", "--rebase"], NETWORK_TIMEOUT)?;
    if !pull.status_success {
        let stderr = pull.stderr.to_lowercase();
        if stderr.contains("could not resolve host") || stderr.contains("no remote") || stderr.contains("no configured push") {
            tracing::info!("sync offline: {}", pull.stderr.trim());
            return Ok(false);
        }
        tracing::warn!(stderr = %pull.stderr.trim(), "git pull --rebase hit a conflict or error during sync");
        return Ok(false);
    }

    if pull_only {
        push_pending_branches(store, repo_path)?;
        check_pending_prs(config, store, repo_path)?;
        return Ok(true);
    }

    let push = git(store_path, &["push"], NETWORK_TIMEOUT)?;
    let ok = push.status_success;
    if !ok {
        tracing::warn!(stderr = %push.stderr.trim(), "git push failed during sync");
    }

    push_pending_branches(store, repo_path)?;
    check_pending_prs(config, store, repo_path)?;

    Ok(ok)
}

/// Push any branch whose issue is marked `needs_push`, falling back to
/// `--force-with-lease` on a non-fast-forward rejection, clearing the
/// flag on success.
fn push_pending_branches(store: &IssueStore, repo_path: &Path) -> Result<()> {
    for issue in store.list(None, None)? {
        if !issue.needs_push {
            continue;
        }
        let Some(branch) = &issue.branch else { continue };

        let push = git(repo_path, &["push", "-u", "origin", branch], NETWORK_TIMEOUT)?;
        let pushed = if push.status_success {
            true
        } else if push.stderr.contains("non-fast-forward") || push.stderr.contains("fetch first") {
            let forced = git(repo_path, &["push", "--force-with-lease", "-u", "origin", branch], NETWORK_TIMEOUT)?;
            forced.status_success
        } else {
            false
        };

        if pushed {
            store.update_metadata(&issue.id, |i| i.needs_push = false)?;
        } else {
            tracing::warn!(issue = %issue.id, branch = %branch, "push-pending-branches could not push");
        }
    }
    Ok(())
}

/// Open a PR for any issue sitting in a human-review stage that doesn't
/// have one yet.
fn check_pending_prs(config: &Config, store: &IssueStore, repo_path: &Path) -> Result<()> {
    for issue in store.list(None, None)? {
        if issue.pr_number.is_some() {
            continue;
        }
        if !config.is_human_review(&issue.dot_path()) {
            continue;
        }
        let Some(branch) = &issue.branch else { continue };

        match github::create_pull_request(repo_path, branch, &issue.title, "") {
            Ok((number, url)) => {
                store.update_metadata(&issue.id, |i: &mut Issue| {
                    i.pr_number = Some(number);
                    i.pr_url = Some(url);
                })?;
            }
            Err(e) => {
                tracing::warn!(issue = %issue.id, error = %e, "check-pending-PRs could not open a PR");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
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
  plan:
    role: developer
    human_review: true
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
    fn missing_git_dir_short_circuits_false() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("issues")).unwrap();
        let store = IssueStore::new(dir.path());
        let config = sample_config();
        let result = sync(&config, &store, dir.path(), false, None).unwrap();
        assert!(!result);
    }
}
