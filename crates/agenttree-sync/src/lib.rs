//! Sidecar sync loop and periodic manager hooks (spec §4.15-§4.16): the
//! host-side housekeeping that runs between agent turns, built on top of
//! `agenttree-workflow`.

pub mod manager;
pub mod sync_loop;

pub use manager::{advance_merged_prs, detect_stalls, promote_ready_backlog, reconcile_state_file, spawn_custom_role_agents, StalledIssue};
pub use sync_loop::sync;
