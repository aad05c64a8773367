//! The ephemeral state file (spec §4.5): writes container UUIDs only.
//! Active-agent *listing* is always derived from live multiplexer
//! sessions; this file exists because Apple's container runtime assigns
//! UUIDs asynchronously after `run`, so something has to remember the
//! mapping until the next poll finds it.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::time::Duration;

use agenttree_core::{Error, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::paths;

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateFile {
    #[serde(default)]
    pub active_agents: HashMap<String, AgentState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub container_id: String,
}

pub fn state_key(issue_id: &str, role: &str) -> String {
    format!("{issue_id}:{role}")
}

struct StateLock {
    _file: File,
}

fn acquire_lock(store_root: &Path) -> Result<StateLock> {
    let lock_path = paths::state_lock_path(store_root);
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).write(true).open(&lock_path)?;

    let deadline = std::time::Instant::now() + LOCK_TIMEOUT;
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(StateLock { _file: file }),
            Err(_) if std::time::Instant::now() < deadline => {
                std::thread::sleep(LOCK_POLL);
            }
            Err(_) => {
                tracing::warn!(?LOCK_TIMEOUT, "timed out acquiring state file lock");
                return Err(Error::Transient(format!(
                    "could not acquire state file lock within {LOCK_TIMEOUT:?}"
                )))
            }
        }
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self._file);
    }
}

fn load(store_root: &Path) -> Result<StateFile> {
    let path = paths::state_path(store_root);
    if !path.exists() {
        return Ok(StateFile::default());
    }
    let text = std::fs::read_to_string(&path)?;
    if text.trim().is_empty() {
        return Ok(StateFile::default());
    }
    Ok(serde_yaml::from_str(&text)?)
}

fn save(store_root: &Path, state: &StateFile) -> Result<()> {
    let path = paths::state_path(store_root);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serde_yaml::to_string(state)?;
    let mut tmp = tempfile::NamedTempFile::new_in(path.parent().unwrap())?;
    use std::io::Write;
    tmp.write_all(yaml.as_bytes())?;
    tmp.persist(&path).map_err(|e| Error::Fatal(e.to_string()))?;
    Ok(())
}

/// Register or overwrite a container ID for `(issue_id, role)`.
pub fn register_container(store_root: &Path, issue_id: &str, role: &str, container_id: &str) -> Result<()> {
    let _lock = acquire_lock(store_root)?;
    let mut state = load(store_root)?;
    state
        .active_agents
        .insert(state_key(issue_id, role), AgentState { container_id: container_id.to_string() });
    save(store_root, &state)
}

/// Look up the stored container ID, if any.
pub fn get_container(store_root: &Path, issue_id: &str, role: &str) -> Result<Option<String>> {
    let _lock = acquire_lock(store_root)?;
    let state = load(store_root)?;
    Ok(state.active_agents.get(&state_key(issue_id, role)).map(|a| a.container_id.clone()))
}

/// Remove the `(issue_id, role)` entry. No-op if absent.
pub fn unregister(store_root: &Path, issue_id: &str, role: &str) -> Result<()> {
    let _lock = acquire_lock(store_root)?;
    let mut state = load(store_root)?;
    state.active_agents.remove(&state_key(issue_id, role));
    save(store_root, &state)
}
