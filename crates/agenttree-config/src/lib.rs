//! Config loader (spec §4.1): parses `.agenttree.yaml` into typed structs
//! and exposes the flow/stage/role resolution operations the workflow
//! engine and hook executor are built on.

pub mod hooks;

use agenttree_core::{Error, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

pub use hooks::{Hook, SectionExpect};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub project: String,
    pub worktrees_dir: String,
    pub port_range: String,
    #[serde(default = "default_tool")]
    pub default_tool: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    pub flows: IndexMap<String, Vec<String>>,
    pub stages: IndexMap<String, StageDef>,
    pub roles: IndexMap<String, RoleDef>,
    #[serde(default)]
    pub commands: IndexMap<String, CommandSpec>,
    #[serde(default)]
    pub allow_self_approval: bool,
    #[serde(default)]
    pub save_tmux_history: bool,
    #[serde(default)]
    pub manager: ManagerConfig,
    #[serde(default)]
    pub rollback: RollbackConfig,
    #[serde(default)]
    pub show_issue_yaml: bool,
}

fn default_tool() -> String {
    "claude".to_string()
}

fn default_model() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    Single(String),
    Sequence(Vec<String>),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManagerConfig {
    #[serde(default = "default_stall_threshold")]
    pub stall_threshold_min: u32,
    /// Pane-ready glyph consumed by both agent-start polling and
    /// restart-detection messaging (Open Question decision, DESIGN.md).
    #[serde(default = "default_prompt_glyph")]
    pub prompt_glyph: char,
}

fn default_stall_threshold() -> u32 {
    60
}

fn default_prompt_glyph() -> char {
    '❯'
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RollbackConfig {
    pub max_rollbacks: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StageDef {
    pub role: String,
    #[serde(default)]
    pub substages: IndexMap<String, SubstageDef>,
    pub output: Option<String>,
    pub review_doc: Option<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub human_review: bool,
    #[serde(default)]
    pub redirect_only: bool,
    #[serde(default)]
    pub terminal: bool,
    #[serde(default)]
    pub is_parking_lot: bool,
    pub color: Option<String>,
    pub skill: Option<String>,
    #[serde(default)]
    pub pre_completion: Vec<Hook>,
    #[serde(default)]
    pub post_start: Vec<Hook>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubstageDef {
    pub output: Option<String>,
    pub review_doc: Option<String>,
    pub model: Option<String>,
    pub skill: Option<String>,
    #[serde(default)]
    pub pre_completion: Vec<Hook>,
    #[serde(default)]
    pub post_start: Vec<Hook>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ContainerSpec {
    Enabled(bool),
    Detailed { enabled: bool, image: Option<String> },
}

impl ContainerSpec {
    pub fn is_enabled(&self) -> bool {
        match self {
            ContainerSpec::Enabled(b) => *b,
            ContainerSpec::Detailed { enabled, .. } => *enabled,
        }
    }

    pub fn image(&self) -> Option<&str> {
        match self {
            ContainerSpec::Enabled(_) => None,
            ContainerSpec::Detailed { image, .. } => image.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleDef {
    pub container: ContainerSpec,
    pub tool: String,
    pub model: String,
    pub skill: Option<String>,
}

/// Split `stage.substage` into its parts; a bare stage has no substage.
pub fn split_dot_path(dot_path: &str) -> (&str, Option<&str>) {
    match dot_path.split_once('.') {
        Some((stage, sub)) => (stage, Some(sub)),
        None => (dot_path, None),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&text).map_err(Error::from)
    }

    pub fn port_bounds(&self) -> Result<(u16, u16)> {
        let (lo, hi) = self
            .port_range
            .split_once('-')
            .ok_or_else(|| Error::Fatal(format!("invalid port_range: {}", self.port_range)))?;
        let lo: u16 = lo.trim().parse().map_err(|_| Error::Fatal(format!("invalid port_range: {}", self.port_range)))?;
        let hi: u16 = hi.trim().parse().map_err(|_| Error::Fatal(format!("invalid port_range: {}", self.port_range)))?;
        Ok((lo, hi))
    }

    pub fn stage_for(&self, dot_path: &str) -> Option<&StageDef> {
        let (stage, _) = split_dot_path(dot_path);
        self.stages.get(stage)
    }

    pub fn substage_for(&self, dot_path: &str) -> Option<&SubstageDef> {
        let (stage, sub) = split_dot_path(dot_path);
        let sub = sub?;
        self.stages.get(stage)?.substages.get(sub)
    }

    pub fn role_for(&self, dot_path: &str) -> Option<&str> {
        self.stage_for(dot_path).map(|s| s.role.as_str())
    }

    pub fn parking_lot_stages(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|(_, def)| def.is_parking_lot)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn human_review_stages(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|(_, def)| def.human_review)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn is_parking_lot(&self, dot_path: &str) -> bool {
        self.stage_for(dot_path).map(|s| s.is_parking_lot).unwrap_or(false)
    }

    pub fn is_human_review(&self, dot_path: &str) -> bool {
        self.stage_for(dot_path).map(|s| s.human_review).unwrap_or(false)
    }

    pub fn is_terminal(&self, dot_path: &str) -> bool {
        self.stage_for(dot_path).map(|s| s.terminal).unwrap_or(false)
    }

    pub fn is_redirect_only(&self, dot_path: &str) -> bool {
        self.stage_for(dot_path).map(|s| s.redirect_only).unwrap_or(false)
    }

    /// Ordered dot-path list for a flow.
    pub fn flow_stage_names(&self, flow: &str) -> Result<&[String]> {
        self.flows
            .get(flow)
            .map(|v| v.as_slice())
            .ok_or_else(|| Error::not_found(format!("flow '{flow}'")))
    }

    /// Resolve `(next_dot_path, is_human_review)` given the current
    /// position in `flow`. The last stage of a flow has no "next" — callers
    /// treat that as a validation error (nothing to advance to).
    pub fn next_in_flow(&self, flow: &str, dot_path: &str) -> Result<(String, bool)> {
        let stages = self.flow_stage_names(flow)?;
        let idx = stages
            .iter()
            .position(|s| s == dot_path)
            .ok_or_else(|| Error::not_found(format!("'{dot_path}' in flow '{flow}'")))?;
        let next = stages
            .get(idx + 1)
            .ok_or_else(|| Error::validation(format!("'{dot_path}' is the last stage of flow '{flow}'")))?;
        Ok((next.clone(), self.is_human_review(next)))
    }

    /// Model resolution cascade: substage -> stage -> role default -> config default.
    pub fn model_for(&self, dot_path: &str, role: &str) -> String {
        if let Some(sub) = self.substage_for(dot_path) {
            if let Some(m) = &sub.model {
                return m.clone();
            }
        }
        if let Some(stage) = self.stage_for(dot_path) {
            if let Some(m) = &stage.model {
                return m.clone();
            }
        }
        if let Some(role_def) = self.roles.get(role) {
            return role_def.model.clone();
        }
        self.default_model.clone()
    }

    pub fn skill_path(&self, dot_path: &str) -> Option<String> {
        if let Some(sub) = self.substage_for(dot_path) {
            if sub.skill.is_some() {
                return sub.skill.clone();
            }
        }
        self.stage_for(dot_path).and_then(|s| s.skill.clone())
    }

    pub fn output_for(&self, dot_path: &str) -> Option<String> {
        if let Some(sub) = self.substage_for(dot_path) {
            if sub.output.is_some() {
                return sub.output.clone();
            }
        }
        self.stage_for(dot_path).and_then(|s| s.output.clone())
    }

    pub fn review_doc_for(&self, dot_path: &str) -> Option<String> {
        if let Some(sub) = self.substage_for(dot_path) {
            if sub.review_doc.is_some() {
                return sub.review_doc.clone();
            }
        }
        self.stage_for(dot_path).and_then(|s| s.review_doc.clone())
    }

    /// Exit hooks for a dot-path: substage list (if any) then stage list.
    pub fn exit_hooks(&self, dot_path: &str) -> Vec<&Hook> {
        let mut hooks = Vec::new();
        if let Some(sub) = self.substage_for(dot_path) {
            hooks.extend(sub.pre_completion.iter());
        }
        if let Some(stage) = self.stage_for(dot_path) {
            hooks.extend(stage.pre_completion.iter());
        }
        hooks
    }

    /// Enter hooks for a dot-path: stage list first, then substage list.
    pub fn enter_hooks(&self, dot_path: &str) -> Vec<&Hook> {
        let mut hooks = Vec::new();
        if let Some(stage) = self.stage_for(dot_path) {
            hooks.extend(stage.post_start.iter());
        }
        if let Some(sub) = self.substage_for(dot_path) {
            hooks.extend(sub.post_start.iter());
        }
        hooks
    }

    /// Is `dot_path` addressable at all: either listed in `flow`, or a
    /// configured parking-lot stage.
    pub fn is_valid_target(&self, flow: &str, dot_path: &str) -> bool {
        if self.is_parking_lot(dot_path) {
            return true;
        }
        self.flows.get(flow).map(|stages| stages.iter().any(|s| s == dot_path)).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Config {
        let yaml = r#"
project: demo
worktrees_dir: /tmp/worktrees
port_range: "9000-9099"
default_tool: claude
default_model: sonnet
flows:
  default: [explore, plan, implement, implement.review, accept]
stages:
  explore:
    role: developer
    output: research.md
  plan:
    role: developer
    output: spec.md
    human_review: true
  implement:
    role: developer
    substages:
      review:
        role_override_not_a_field: true
        output: review.md
  accept:
    role: manager
    terminal: true
  backlog:
    role: manager
    is_parking_lot: true
roles:
  developer:
    container: true
    tool: claude
    model: sonnet
  manager:
    container: false
    tool: claude
    model: sonnet
"#;
        serde_yaml::from_str(yaml).expect("config parses")
    }

    #[test]
    fn next_in_flow_walks_ordered_list() {
        let cfg = sample_config();
        let (next, _) = cfg.next_in_flow("default", "explore").unwrap();
        assert_eq!(next, "plan");
    }

    #[test]
    fn next_in_flow_flags_human_review() {
        let cfg = sample_config();
        let (_, is_review) = cfg.next_in_flow("default", "explore").unwrap();
        assert!(is_review);
    }

    #[test]
    fn last_stage_has_no_next() {
        let cfg = sample_config();
        let err = cfg.next_in_flow("default", "accept").unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn parking_lot_is_valid_outside_flow() {
        let cfg = sample_config();
        assert!(cfg.is_valid_target("default", "backlog"));
        assert!(!cfg.is_valid_target("default", "not_a_stage"));
    }

    #[test]
    fn stage_for_strips_substage() {
        let cfg = sample_config();
        assert_eq!(cfg.stage_for("implement.review").unwrap().role, "developer");
    }
}
