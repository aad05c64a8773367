//! Everything that shells out: worktrees, containers, the multiplexer,
//! `gh`, and preflight checks (spec §4.9–§4.14).

pub mod container;
pub mod detect;
pub mod exec;
pub mod github;
pub mod lifecycle;
pub mod multiplexer;
pub mod preflight;
pub mod worktree;

pub use lifecycle::{stop_agent, stop_all_agents_for_issue, start_agent, StartOptions, StartedAgent, StopOptions};
pub use github::monitor_pr_and_auto_merge;
