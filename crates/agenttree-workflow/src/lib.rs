//! Workflow engine crate (spec §4.8-§4.11): stage transitions, rollback,
//! dependency-graph queries, the derived active-agent view, and the
//! config-aware agent-start wrapper, all built on top of
//! `agenttree-store` and `agenttree-hooks`.

pub mod active_agent;
pub mod context;
pub mod deps;
pub mod engine;
pub mod rollback;
pub mod start;

pub use active_agent::{list_active_agents, ActiveAgent};
pub use context::Environment;
pub use deps::{blocked_backlog_issues, is_ready, ready_backlog_issues};
pub use engine::{advance, reassess, AdvanceOutcome, AdvanceRequest, ReorientInfo, Trigger};
pub use rollback::{rollback, RollbackOptions};
pub use start::{start_agent_for_issue, StartRequest, StartResult};
