//! The Issue data model (spec §3), translated from the original `Issue`
//! pydantic model into idiomatic serde types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Zero-padded width for issue IDs in directory names and display.
/// IDs beyond 999 still work; padding just stops helping lexicographic
/// sort past that point.
pub const ID_PAD_WIDTH: usize = 3;

/// Render an issue number as a zero-padded ID string.
pub fn pad_issue_id(num: u32) -> String {
    format!("{:0width$}", num, width = ID_PAD_WIDTH)
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// A single entry in an issue's stage history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub substage: Option<String>,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<u32>,
    #[serde(default = "default_history_type")]
    pub r#type: String,
}

fn default_history_type() -> String {
    "transition".to_string()
}

impl HistoryEntry {
    pub fn transition(stage: impl Into<String>, substage: Option<String>, timestamp: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            substage,
            timestamp: timestamp.into(),
            agent: None,
            r#type: "transition".to_string(),
        }
    }

    pub fn rollback(stage: impl Into<String>, substage: Option<String>, timestamp: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            substage,
            timestamp: timestamp.into(),
            agent: None,
            r#type: "rollback".to_string(),
        }
    }
}

/// An issue in the AgentTree workflow.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub created: String,
    pub updated: String,

    pub flow: String,
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub substage: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worktree_dir: Option<String>,

    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub priority: Priority,

    /// IDs of issues that must reach the accepted stage before this one
    /// can start. Always normalized to `ID_PAD_WIDTH`-padded form.
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_issue: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevant_url: Option<String>,

    #[serde(default)]
    pub history: Vec<HistoryEntry>,

    /// Stage name at which a custom (non-standard-flow) agent was spawned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_agent_spawned: Option<String>,

    /// True once escalated to a human after repeated CI failures.
    #[serde(default)]
    pub ci_escalated: bool,

    /// Set while a workflow transition is mid-flight, so a crash mid-hook
    /// leaves a record of which half of the transition was interrupted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing: Option<Processing>,

    /// True when local commits exist that haven't been pushed yet.
    #[serde(default)]
    pub needs_push: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Processing {
    Entering,
    Exiting,
}

impl Issue {
    /// The issue's directory name under `_agenttree/issues/`.
    pub fn dir_name(&self) -> String {
        format!("{}-{}", self.id, self.slug)
    }

    /// Dot-path form of the current position, e.g. `implement.review`.
    pub fn dot_path(&self) -> String {
        match &self.substage {
            Some(sub) => format!("{}.{}", self.stage, sub),
            None => self.stage.clone(),
        }
    }

    pub fn record_transition(&mut self, stage: impl Into<String>, substage: Option<String>, timestamp: impl Into<String>) {
        let timestamp = timestamp.into();
        self.stage = stage.into();
        self.substage = substage.clone();
        self.updated = timestamp.clone();
        self.history.push(HistoryEntry::transition(self.stage.clone(), substage, timestamp));
    }

    pub fn record_rollback(&mut self, stage: impl Into<String>, substage: Option<String>, timestamp: impl Into<String>) {
        let timestamp = timestamp.into();
        self.stage = stage.into();
        self.substage = substage.clone();
        self.updated = timestamp.clone();
        self.history.push(HistoryEntry::rollback(self.stage.clone(), substage, timestamp));
    }
}
