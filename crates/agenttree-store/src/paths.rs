//! Store-root discovery, including the worktree-indirection walk
//! (original `get_agenttree_path`).

use std::path::{Path, PathBuf};

pub const STORE_DIR_NAME: &str = "_agenttree";

/// Find `_agenttree/` starting from `cwd`. If `cwd` is inside a worktree
/// (its `.git` is a *file* pointing at
/// `<main-repo>/.git/worktrees/<name>`), follow that indirection back to
/// the main repo and look for `_agenttree` there, since the store is
/// gitignored inside worktrees.
pub fn resolve_store_root(cwd: &Path) -> PathBuf {
    let local = cwd.join(STORE_DIR_NAME);
    if local.is_symlink() || local.join("issues").exists() {
        return local;
    }

    let git_path = cwd.join(".git");
    if git_path.is_file() {
        if let Ok(content) = std::fs::read_to_string(&git_path) {
            let content = content.trim();
            if let Some(gitdir) = content.strip_prefix("gitdir:") {
                let gitdir = PathBuf::from(gitdir.trim());
                // .../<main-repo>/.git/worktrees/<name> -> <main-repo>
                if let Some(main_repo) = gitdir.parent().and_then(|p| p.parent()).and_then(|p| p.parent()) {
                    let candidate = main_repo.join(STORE_DIR_NAME);
                    if candidate.exists() {
                        return candidate;
                    }
                }
            }
        }
    }

    local
}

pub fn issues_dir(store_root: &Path) -> PathBuf {
    store_root.join("issues")
}

pub fn sessions_dir(store_root: &Path) -> PathBuf {
    store_root.join("sessions")
}

pub fn templates_dir(store_root: &Path) -> PathBuf {
    store_root.join("templates")
}

pub fn skills_dir(store_root: &Path) -> PathBuf {
    store_root.join("skills")
}

pub fn state_path(store_root: &Path) -> PathBuf {
    store_root.join("state.yaml")
}

pub fn state_lock_path(store_root: &Path) -> PathBuf {
    store_root.join("state.yaml.lock")
}

pub fn issue_dir(store_root: &Path, padded_id: &str, slug: &str) -> PathBuf {
    issues_dir(store_root).join(format!("{padded_id}-{slug}"))
}

pub fn session_path(store_root: &Path, padded_id: &str) -> PathBuf {
    sessions_dir(store_root).join(format!("{padded_id}.yaml"))
}
