//! Session (restart) tracker (spec §4.4): one YAML file per issue
//! answering "is the human hitting `next` a real advance or a restart?"

use std::path::Path;

use agenttree_core::Result;
use serde::{Deserialize, Serialize};

use crate::paths;
use crate::write::write_atomic;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub issue_id: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oriented_at_stage: Option<String>,
}

impl Session {
    pub fn new(issue_id: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self { issue_id: issue_id.into(), created_at: created_at.into(), oriented_at_stage: None }
    }
}

pub fn load(store_root: &Path, padded_id: &str) -> Result<Option<Session>> {
    let path = paths::session_path(store_root, padded_id);
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path)?;
    Ok(Some(serde_yaml::from_str(&text)?))
}

pub fn save(store_root: &Path, padded_id: &str, session: &Session) -> Result<()> {
    let path = paths::session_path(store_root, padded_id);
    let yaml = serde_yaml::to_string(session)?;
    write_atomic(&path, yaml.as_bytes())
}

pub fn delete(store_root: &Path, padded_id: &str) -> Result<()> {
    let path = paths::session_path(store_root, padded_id);
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

/// Record that the agent is now oriented at `stage` (current dot-path or
/// stage name, per the workflow engine's choice at the call site).
pub fn mark_oriented(store_root: &Path, padded_id: &str, stage: &str) -> Result<()> {
    let path = paths::session_path(store_root, padded_id);
    let mut session = load(store_root, padded_id)?.unwrap_or_else(|| {
        Session::new(padded_id, chrono::Utc::now().to_rfc3339())
    });
    session.oriented_at_stage = Some(stage.to_string());
    let yaml = serde_yaml::to_string(&session)?;
    write_atomic(&path, yaml.as_bytes())
}

/// True if the session exists and its `oriented_at_stage` differs from
/// `current_stage` — i.e. the agent was restarted mid-stage and needs
/// re-orientation instead of an advance.
pub fn needs_reorientation(store_root: &Path, padded_id: &str, current_stage: &str) -> Result<bool> {
    match load(store_root, padded_id)? {
        Some(session) => Ok(session.oriented_at_stage.as_deref() != Some(current_stage)),
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn no_session_means_no_reorientation_needed() {
        let dir = tempdir().unwrap();
        assert!(!needs_reorientation(dir.path(), "001", "plan").unwrap());
    }

    #[test]
    fn mismatched_oriented_stage_triggers_reorientation() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sessions")).unwrap();
        mark_oriented(dir.path(), "001", "plan").unwrap();
        assert!(needs_reorientation(dir.path(), "001", "implement").unwrap());
        assert!(!needs_reorientation(dir.path(), "001", "plan").unwrap());
    }

    #[test]
    fn delete_removes_file() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sessions")).unwrap();
        mark_oriented(dir.path(), "001", "plan").unwrap();
        delete(dir.path(), "001").unwrap();
        assert!(load(dir.path(), "001").unwrap().is_none());
    }
}
