//! On-disk issue store: CRUD, attachments, dependency graph, session
//! tracker, ephemeral state file, deterministic naming (spec §4.2–§4.5).

pub mod attachments;
pub mod issue;
pub mod naming;
pub mod paths;
pub mod session;
pub mod state;
mod write;

pub use issue::IssueStore;
pub use write::write_atomic;
