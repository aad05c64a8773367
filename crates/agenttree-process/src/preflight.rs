//! Batch dependency checking (spec §4.9 step 1), ported from
//! `original_source/agenttree/dependencies.py::check_all_dependencies`:
//! report every failure at once rather than failing fast.

use std::path::Path;
use std::time::Duration;

use crate::container;
use crate::exec;

pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub description: String,
    pub fix_instructions: Option<&'static str>,
    /// If false, a failure is a warning only and doesn't block startup.
    pub required: bool,
}

const GH_CLI_INSTALL_INSTRUCTIONS: &str = "Install from https://cli.github.com/\n  macOS:   brew install gh\n  Linux:   See https://github.com/cli/cli#installation\n  Windows: See https://github.com/cli/cli#installation";

pub fn check_git_repo(path: &Path) -> CheckResult {
    let git_dir = path.join(".git");
    if git_dir.exists() {
        CheckResult { name: "git_repo", passed: true, description: "Git repository detected".into(), fix_instructions: None, required: true }
    } else {
        CheckResult {
            name: "git_repo",
            passed: false,
            description: "Not a git repository".into(),
            fix_instructions: Some("Run `git init` to create a repository, or navigate to an existing git repo"),
            required: true,
        }
    }
}

pub fn check_gh_installed() -> CheckResult {
    if which::which("gh").is_ok() {
        CheckResult { name: "gh_installed", passed: true, description: "GitHub CLI installed".into(), fix_instructions: None, required: true }
    } else {
        CheckResult {
            name: "gh_installed",
            passed: false,
            description: "GitHub CLI not installed".into(),
            fix_instructions: Some(GH_CLI_INSTALL_INSTRUCTIONS),
            required: true,
        }
    }
}

pub fn check_gh_authenticated() -> CheckResult {
    match exec::run("gh", &["auth", "status"], None, Duration::from_secs(5)) {
        Ok(out) if out.status_success => {
            CheckResult { name: "gh_authenticated", passed: true, description: "GitHub CLI authenticated".into(), fix_instructions: None, required: true }
        }
        Ok(_) => CheckResult {
            name: "gh_authenticated",
            passed: false,
            description: "GitHub CLI not authenticated".into(),
            fix_instructions: Some("Run `gh auth login` to authenticate. This will open your browser to log in to GitHub."),
            required: true,
        },
        Err(_) => CheckResult {
            name: "gh_authenticated",
            passed: false,
            description: "GitHub CLI auth check timed out or failed (network issue?)".into(),
            fix_instructions: Some("Check your network connection and try `gh auth status` manually"),
            required: true,
        },
    }
}

pub fn check_container_runtime() -> CheckResult {
    match container::detect_runtime() {
        Some(rt) => CheckResult {
            name: "container_runtime",
            passed: true,
            description: format!("Container runtime available ({})", rt.binary()),
            fix_instructions: None,
            required: false,
        },
        None => CheckResult {
            name: "container_runtime",
            passed: false,
            description: "No container runtime found".into(),
            fix_instructions: Some(container::get_recommended_action()),
            required: false,
        },
    }
}

/// Runs every check, git repo -> gh installed -> gh authenticated (skipped
/// if gh isn't installed) -> container runtime (warning only). Returns
/// `(success, results)`; success is false only when a *required* check
/// fails.
pub fn check_all(repo_path: &Path) -> (bool, Vec<CheckResult>) {
    let mut results = Vec::new();

    results.push(check_git_repo(repo_path));

    let gh_installed = check_gh_installed();
    let gh_ok = gh_installed.passed;
    results.push(gh_installed);

    if gh_ok {
        results.push(check_gh_authenticated());
    } else {
        results.push(CheckResult {
            name: "gh_authenticated",
            passed: false,
            description: "Skipped (gh not installed)".into(),
            fix_instructions: Some("Install gh CLI first"),
            required: true,
        });
    }

    results.push(check_container_runtime());

    let success = results.iter().filter(|r| r.required).all(|r| r.passed);
    (success, results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_git_repo_is_required_failure() {
        let dir = tempdir().unwrap();
        let result = check_git_repo(dir.path());
        assert!(!result.passed);
        assert!(result.required);
    }

    #[test]
    fn container_runtime_check_never_blocks() {
        let result = check_container_runtime();
        assert!(!result.required);
    }

    #[test]
    fn check_all_fails_only_on_required_checks() {
        let dir = tempdir().unwrap();
        let (success, results) = check_all(dir.path());
        assert!(!success);
        assert!(results.iter().any(|r| r.name == "git_repo" && !r.passed));
    }
}
