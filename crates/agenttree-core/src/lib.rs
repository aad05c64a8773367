//! Shared types, error taxonomy, and ID/slug primitives used by every
//! AgentTree crate.

pub mod error;
pub mod ids;
pub mod types;

pub use error::{Error, Result};
pub use types::{pad_issue_id, HistoryEntry, Issue, Priority, Processing, ID_PAD_WIDTH};
