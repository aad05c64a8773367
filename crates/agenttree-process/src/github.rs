//! GitHub driver (spec §4.14): thin wrapper around the `gh` CLI.

use std::path::Path;
use std::time::Duration;

use agenttree_core::{Error, Result};

use crate::exec;

const GH_TIMEOUT: Duration = Duration::from_secs(30);

fn gh(args: &[&str], cwd: Option<&Path>) -> Result<exec::Output> {
    exec::run("gh", args, cwd, GH_TIMEOUT)
}

pub fn ensure_gh_cli() -> Result<()> {
    if which::which("gh").is_err() {
        return Err(Error::PreflightError("GitHub CLI (gh) is not installed".to_string()));
    }
    let status = gh(&["auth", "status"], None)?;
    if !status.status_success {
        return Err(Error::PreflightError("GitHub CLI is not authenticated; run `gh auth login`".to_string()));
    }
    Ok(())
}

/// Open a PR from `branch`, returning its number.
pub fn create_pull_request(repo_path: &Path, branch: &str, title: &str, body: &str) -> Result<(u64, String)> {
    let out = gh(&["pr", "create", "--head", branch, "--title", title, "--body", body], Some(repo_path))?;
    if !out.status_success {
        return Err(Error::Fatal(format!("gh pr create failed: {}", out.stderr.trim())));
    }
    let url = out.stdout.trim().to_string();
    let number = url.rsplit('/').next().and_then(|s| s.parse::<u64>().ok()).ok_or_else(|| {
        Error::Fatal(format!("could not parse PR number from gh output: {url}"))
    })?;
    Ok((number, url))
}

pub struct ApprovalStatus {
    pub approved: bool,
    pub author: String,
}

pub fn get_pr_approval_status(repo_path: &Path, number: u64) -> Result<ApprovalStatus> {
    let number_str = number.to_string();
    let out = gh(
        &["pr", "view", &number_str, "--json", "reviewDecision,author"],
        Some(repo_path),
    )?;
    if !out.status_success {
        return Err(Error::Fatal(format!("gh pr view failed: {}", out.stderr.trim())));
    }
    let approved = out.stdout.contains("\"reviewDecision\":\"APPROVED\"");
    let author = extract_json_string(&out.stdout, "login").unwrap_or_default();
    Ok(ApprovalStatus { approved, author })
}

fn extract_json_string(text: &str, key: &str) -> Option<String> {
    let needle = format!("\"{key}\":\"");
    let start = text.find(&needle)? + needle.len();
    let rest = &text[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

pub fn merge_pr(repo_path: &Path, number: u64) -> Result<()> {
    let number_str = number.to_string();
    let out = gh(&["pr", "merge", &number_str, "--squash"], Some(repo_path))?;
    if out.status_success {
        Ok(())
    } else {
        Err(Error::Fatal(format!("gh pr merge failed: {}", out.stderr.trim())))
    }
}

/// True if the PR has been merged (by any means, including externally).
pub fn is_pr_merged(repo_path: &Path, number: u64) -> Result<bool> {
    let number_str = number.to_string();
    let out = gh(&["pr", "view", &number_str, "--json", "state"], Some(repo_path))?;
    if !out.status_success {
        return Err(Error::Fatal(format!("gh pr view failed: {}", out.stderr.trim())));
    }
    Ok(out.stdout.contains("\"state\":\"MERGED\""))
}

fn ci_status(repo_path: &Path, number: u64) -> Result<CiStatus> {
    let number_str = number.to_string();
    let out = gh(&["pr", "checks", &number_str, "--json", "state"], Some(repo_path))?;
    if !out.status_success {
        // `gh pr checks` exits non-zero when any check has failed, but
        // still prints JSON we can inspect.
        if out.stdout.contains("\"state\":\"FAILURE\"") {
            return Ok(CiStatus::Failed);
        }
        return Ok(CiStatus::Pending);
    }
    if out.stdout.contains("\"state\":\"FAILURE\"") {
        Ok(CiStatus::Failed)
    } else if out.stdout.is_empty() || out.stdout.contains("\"state\":\"PENDING\"") || out.stdout.contains("\"state\":\"IN_PROGRESS\"") {
        Ok(CiStatus::Pending)
    } else {
        Ok(CiStatus::Passed)
    }
}

enum CiStatus {
    Pending,
    Passed,
    Failed,
}

/// Poll CI + approval status and merge once both are satisfied, or error
/// once `max_wait` elapses or CI reports a failure. `require_approval =
/// false` lets a passing CI run alone trigger the merge (spec §4.14).
pub fn monitor_pr_and_auto_merge(repo_path: &Path, number: u64, require_approval: bool, max_wait: Duration) -> Result<()> {
    let deadline = std::time::Instant::now() + max_wait;
    let poll_interval = Duration::from_secs(15);

    loop {
        match ci_status(repo_path, number)? {
            CiStatus::Failed => return Err(Error::Fatal(format!("PR #{number} failed CI checks"))),
            CiStatus::Passed => {
                let approved = if require_approval { get_pr_approval_status(repo_path, number)?.approved } else { true };
                if approved {
                    return merge_pr(repo_path, number);
                }
            }
            CiStatus::Pending => {}
        }

        if std::time::Instant::now() >= deadline {
            return Err(Error::Transient(format!("PR #{number} did not become mergeable within {max_wait:?}")));
        }
        std::thread::sleep(poll_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_login_field_from_gh_json() {
        let json = r#"{"author":{"login":"octocat"},"reviewDecision":"APPROVED"}"#;
        assert_eq!(extract_json_string(json, "login"), Some("octocat".to_string()));
    }

    #[test]
    fn detects_approved_review_decision() {
        let json = r#"{"reviewDecision":"APPROVED"}"#;
        assert!(json.contains("\"reviewDecision\":\"APPROVED\""));
    }
}
