//! Issue CRUD (spec §4.2): every mutation takes the process-wide lock,
//! mutates an in-memory copy, and writes back atomically.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use agenttree_core::ids::{detect_circular_dependency, normalize_id, slugify};
use agenttree_core::{pad_issue_id, Error, Issue, Priority, Processing, Result};

use crate::paths;
use crate::write::write_atomic;

fn mutation_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

pub struct IssueStore {
    root: PathBuf,
}

impl IssueStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn issue_yaml_path(&self, dir_name: &str) -> PathBuf {
        paths::issues_dir(&self.root).join(dir_name).join("issue.yaml")
    }

    fn find_dir_name(&self, padded_id: &str) -> Result<String> {
        let issues_dir = paths::issues_dir(&self.root);
        if !issues_dir.exists() {
            return Err(Error::not_found(format!("issue {padded_id}")));
        }
        for entry in std::fs::read_dir(&issues_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == "archive" {
                continue;
            }
            if name.starts_with(&format!("{padded_id}-")) {
                return Ok(name);
            }
        }
        Err(Error::not_found(format!("issue {padded_id}")))
    }

    pub fn get(&self, padded_id: &str) -> Result<Issue> {
        let dir_name = self.find_dir_name(padded_id)?;
        self.read_issue(&dir_name)
    }

    fn read_issue(&self, dir_name: &str) -> Result<Issue> {
        let path = self.issue_yaml_path(dir_name);
        let text = std::fs::read_to_string(&path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    fn write_issue(&self, issue: &Issue) -> Result<()> {
        let path = self.issue_yaml_path(&issue.dir_name());
        let yaml = serde_yaml::to_string(issue)?;
        write_atomic(&path, yaml.as_bytes())
    }

    pub fn list(&self, stage: Option<&str>, priority: Option<Priority>) -> Result<Vec<Issue>> {
        let issues_dir = paths::issues_dir(&self.root);
        if !issues_dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&issues_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == "archive" {
                continue;
            }
            let issue = self.read_issue(&name)?;
            if let Some(s) = stage {
                if issue.stage != s {
                    continue;
                }
            }
            if let Some(p) = priority {
                if issue.priority != p {
                    continue;
                }
            }
            out.push(issue);
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    fn next_issue_number(&self) -> Result<u32> {
        let issues_dir = paths::issues_dir(&self.root);
        if !issues_dir.exists() {
            return Ok(1);
        }
        let mut max_num = 0u32;
        for entry in std::fs::read_dir(&issues_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == "archive" {
                continue;
            }
            if let Some((num_str, _)) = name.split_once('-') {
                if let Ok(num) = num_str.parse::<u32>() {
                    max_num = max_num.max(num);
                }
            }
        }
        Ok(max_num + 1)
    }

    fn unique_slug(&self, base_slug: &str) -> Result<String> {
        let issues_dir = paths::issues_dir(&self.root);
        if !issues_dir.exists() {
            return Ok(base_slug.to_string());
        }
        let mut taken = std::collections::HashSet::new();
        for entry in std::fs::read_dir(&issues_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some((_, slug)) = name.split_once('-') {
                taken.insert(slug.to_string());
            }
        }
        if !taken.contains(base_slug) {
            return Ok(base_slug.to_string());
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base_slug}-{n}");
            if !taken.contains(&candidate) {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    fn dependency_graph(&self) -> Result<HashMap<String, Vec<String>>> {
        let mut graph = HashMap::new();
        for issue in self.list(None, None)? {
            graph.insert(issue.id.clone(), issue.dependencies.clone());
        }
        Ok(graph)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        title: &str,
        priority: Priority,
        flow: &str,
        stage: &str,
        substage: Option<String>,
        dependencies: Vec<String>,
    ) -> Result<Issue> {
        let _guard = mutation_lock().lock().unwrap();

        let num = self.next_issue_number()?;
        let padded_id = pad_issue_id(num);
        let base_slug = slugify(title);
        let slug = self.unique_slug(&base_slug)?;

        let normalized_deps: Vec<String> = dependencies.iter().map(|d| normalize_id(d)).collect();
        let graph = self.dependency_graph()?;
        if let Some(cycle) = detect_circular_dependency(&padded_id, &normalized_deps, &graph) {
            return Err(Error::validation(format!(
                "circular dependency detected: {}",
                cycle.join(" -> ")
            )));
        }

        let now = chrono::Utc::now().to_rfc3339();
        let issue = Issue {
            id: padded_id.clone(),
            slug,
            title: title.to_string(),
            created: now.clone(),
            updated: now.clone(),
            flow: flow.to_string(),
            stage: stage.to_string(),
            substage,
            branch: None,
            worktree_dir: None,
            labels: Vec::new(),
            priority,
            dependencies: normalized_deps,
            github_issue: None,
            pr_number: None,
            pr_url: None,
            relevant_url: None,
            history: vec![agenttree_core::HistoryEntry::transition(
                stage.to_string(),
                None,
                now,
            )],
            custom_agent_spawned: None,
            ci_escalated: false,
            processing: None,
            needs_push: false,
        };

        let dir = paths::issue_dir(&self.root, &padded_id, &issue.slug);
        std::fs::create_dir_all(dir.join("attachments"))?;
        std::fs::create_dir_all(dir.join("archive"))?;
        self.write_issue(&issue)?;
        Ok(issue)
    }

    pub fn update_stage(
        &self,
        padded_id: &str,
        stage: &str,
        substage: Option<String>,
        agent: Option<u32>,
        entry_type: &str,
    ) -> Result<Issue> {
        let _guard = mutation_lock().lock().unwrap();
        let dir_name = self.find_dir_name(padded_id)?;
        let mut issue = self.read_issue(&dir_name)?;
        let now = chrono::Utc::now().to_rfc3339();
        issue.stage = stage.to_string();
        issue.substage = substage.clone();
        issue.updated = now.clone();
        let mut entry = if entry_type == "rollback" {
            agenttree_core::HistoryEntry::rollback(stage.to_string(), substage, now)
        } else {
            agenttree_core::HistoryEntry::transition(stage.to_string(), substage, now)
        };
        entry.agent = agent;
        issue.history.push(entry);
        self.write_issue(&issue)?;
        Ok(issue)
    }

    pub fn update_metadata(&self, padded_id: &str, f: impl FnOnce(&mut Issue)) -> Result<Issue> {
        let _guard = mutation_lock().lock().unwrap();
        let dir_name = self.find_dir_name(padded_id)?;
        let mut issue = self.read_issue(&dir_name)?;
        f(&mut issue);
        issue.updated = chrono::Utc::now().to_rfc3339();
        self.write_issue(&issue)?;
        Ok(issue)
    }

    pub fn update_priority(&self, padded_id: &str, priority: Priority) -> Result<Issue> {
        self.update_metadata(padded_id, |issue| issue.priority = priority)
    }

    pub fn remove_dependency(&self, padded_id: &str, dep_id: &str) -> Result<Issue> {
        let normalized = normalize_id(dep_id);
        self.update_metadata(padded_id, |issue| issue.dependencies.retain(|d| d != &normalized))
    }

    pub fn set_processing(&self, padded_id: &str, processing: Option<Processing>) -> Result<Issue> {
        self.update_metadata(padded_id, |issue| issue.processing = processing)
    }

    pub fn add_dependency(&self, padded_id: &str, dep_id: &str) -> Result<Issue> {
        let _guard = mutation_lock().lock().unwrap();
        let dir_name = self.find_dir_name(padded_id)?;
        let mut issue = self.read_issue(&dir_name)?;

        let normalized_dep = normalize_id(dep_id);
        let mut proposed = issue.dependencies.clone();
        proposed.push(normalized_dep.clone());

        let graph = self.dependency_graph()?;
        if let Some(cycle) = detect_circular_dependency(padded_id, &proposed, &graph) {
            return Err(Error::validation(format!(
                "circular dependency detected: {}",
                cycle.join(" -> ")
            )));
        }

        if !issue.dependencies.contains(&normalized_dep) {
            issue.dependencies.push(normalized_dep);
        }
        issue.updated = chrono::Utc::now().to_rfc3339();
        self.write_issue(&issue)?;
        Ok(issue)
    }
}
