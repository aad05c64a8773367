//! Shared plumbing for assembling a `HookContext` from config + store,
//! used by the workflow engine, the agent-start path, and (via re-export)
//! the manager-hooks loop in `agenttree-sync`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use agenttree_config::Config;
use agenttree_core::Issue;
use agenttree_hooks::HookContext;
use agenttree_store::{paths, IssueStore};

pub struct Environment<'a> {
    pub config: &'a Config,
    pub store: &'a IssueStore,
    pub repo_path: &'a Path,
    pub project: &'a str,
    templates_dir: PathBuf,
}

impl<'a> Environment<'a> {
    pub fn new(config: &'a Config, store: &'a IssueStore, repo_path: &'a Path, project: &'a str) -> Self {
        let templates_dir = paths::templates_dir(store.root());
        Self { config, store, repo_path, project, templates_dir }
    }

    pub fn store_root(&self) -> &Path {
        self.store.root()
    }

    pub fn issue_dir(&self, issue: &Issue) -> PathBuf {
        paths::issue_dir(self.store_root(), &issue.id, &issue.slug)
    }

    /// Build a `HookContext` for running hooks against `issue`. `role` is
    /// the role driving the relevant stage (the hook executor only needs
    /// it for `cleanup_agent`).
    pub fn hook_context<'b>(
        &'b self,
        issue: &'b Issue,
        issue_dir: &'b Path,
        role: &'b str,
        context_vars: &'b HashMap<String, String>,
    ) -> HookContext<'b> {
        HookContext {
            issue,
            issue_dir,
            repo_path: self.repo_path,
            store_root: self.store_root(),
            templates_dir: &self.templates_dir,
            commands: &self.config.commands,
            project: self.project,
            role,
            in_container: agenttree_process::detect::running_in_container(),
            allow_self_approval: self.config.allow_self_approval,
            context_vars,
            store: self.store,
        }
    }
}
