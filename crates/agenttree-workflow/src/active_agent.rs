//! `ActiveAgent`: the derived view over live multiplexer sessions (spec
//! §3, §4.3). Never persisted — computed fresh from `tmux list-sessions`
//! plus the deterministic naming rules, which is why listing active
//! agents never needs the state-file lock.

use agenttree_core::Result;
use agenttree_store::{naming, IssueStore};

#[derive(Debug, Clone)]
pub struct ActiveAgent {
    pub issue_id: String,
    pub role: String,
    pub tmux_session: String,
    pub container_name: String,
    pub worktree: Option<String>,
    pub branch: Option<String>,
    pub port: u16,
}

/// List every live agent session whose name matches
/// `<project>-<role>-<paddedID>` for a role in `roles`, cross-referenced
/// against the issue store for worktree/branch.
pub fn list_active_agents(project: &str, roles: &[String], store: &IssueStore, base_port: u16) -> Result<Vec<ActiveAgent>> {
    let sessions = agenttree_process::multiplexer::list_sessions()?;
    let mut out = Vec::new();

    for session in &sessions {
        for role in roles {
            let prefix = format!("{project}-{role}-");
            let Some(padded_id) = session.name.strip_prefix(&prefix) else { continue };
            if padded_id.is_empty() || !padded_id.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }

            let (worktree, branch) = match store.get(padded_id) {
                Ok(issue) => (issue.worktree_dir, issue.branch),
                Err(_) => (None, None),
            };

            let issue_num: u32 = padded_id.parse().unwrap_or(0);
            out.push(ActiveAgent {
                issue_id: padded_id.to_string(),
                role: role.clone(),
                tmux_session: session.name.clone(),
                container_name: naming::container_name(project, role, padded_id),
                worktree,
                branch,
                port: naming::deterministic_port(base_port, issue_num),
            });
            break;
        }
    }

    Ok(out)
}
