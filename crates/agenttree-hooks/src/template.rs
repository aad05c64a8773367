//! Template renderer (spec §4.7), ported from
//! `original_source/agenttree/commands.py`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use agenttree_config::CommandSpec;
use agenttree_core::Issue;
use agenttree_process::exec;
use indexmap::IndexMap;
use regex::Regex;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

fn variable_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}").unwrap())
}

/// Run a single shell command, returning trimmed stdout or empty string
/// on failure/timeout — command output never aborts a render.
pub fn execute_command(cmd: &str, cwd: Option<&Path>, timeout: Duration) -> String {
    match exec::run("sh", &["-c", cmd], cwd, timeout) {
        Ok(out) if out.status_success => out.stdout.trim().to_string(),
        _ => String::new(),
    }
}

pub fn execute_commands(cmds: &[String], cwd: Option<&Path>, timeout: Duration) -> String {
    cmds.iter().map(|c| execute_command(c, cwd, timeout)).collect::<Vec<_>>().join("\n")
}

pub fn get_command_output(commands: &IndexMap<String, CommandSpec>, name: &str, cwd: Option<&Path>) -> String {
    match commands.get(name) {
        Some(CommandSpec::Single(cmd)) => execute_command(cmd, cwd, COMMAND_TIMEOUT),
        Some(CommandSpec::Sequence(cmds)) => execute_commands(cmds, cwd, COMMAND_TIMEOUT),
        None => String::new(),
    }
}

/// Scan `template` for `{{ name }}` references and return only the names
/// that are actually configured commands — avoids running unrelated
/// configured commands on every render.
pub fn get_referenced_commands(template: &str, commands: &IndexMap<String, CommandSpec>) -> Vec<String> {
    variable_re()
        .captures_iter(template)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .filter(|name| commands.contains_key(name))
        .collect()
}

/// Render `{{variable}}` substitutions from `context`, falling back to
/// configured command output for names not present in `context`, then to
/// empty string. Not Turing-complete by design: templates are briefings,
/// not programs. Rendering never fails outright; on internal error the
/// raw template is returned unchanged.
pub fn render(template: &str, context: &HashMap<String, String>, commands: &IndexMap<String, CommandSpec>, cwd: Option<&Path>) -> String {
    let referenced = get_referenced_commands(template, commands);
    let mut command_cache: HashMap<String, String> = HashMap::new();
    for name in referenced {
        let output = get_command_output(commands, &name, cwd);
        command_cache.insert(name, output);
    }

    let result = variable_re().replace_all(template, |caps: &regex::Captures| {
        let name = &caps[1];
        if let Some(value) = context.get(name) {
            value.clone()
        } else if let Some(value) = command_cache.get(name) {
            value.clone()
        } else {
            String::new()
        }
    });

    result.into_owned()
}

/// Render context: issue metadata plus the content of every sibling
/// stage-output Markdown file, keyed as `<stem>_md` (e.g. `problem.md` ->
/// `problem_md`), so a template can reference `{{research_md}}` to embed
/// an earlier stage's output.
pub fn issue_context_vars(issue: &Issue, issue_dir: &Path) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    vars.insert("id".to_string(), issue.id.clone());
    vars.insert("title".to_string(), issue.title.clone());
    vars.insert("slug".to_string(), issue.slug.clone());
    vars.insert("stage".to_string(), issue.stage.clone());
    vars.insert("dot_path".to_string(), issue.dot_path());
    vars.insert("priority".to_string(), issue.priority.to_string());
    vars.insert("labels".to_string(), issue.labels.join(", "));
    vars.insert("branch".to_string(), issue.branch.clone().unwrap_or_default());
    vars.insert("flow".to_string(), issue.flow.clone());

    if let Ok(entries) = std::fs::read_dir(issue_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            if let Ok(content) = std::fs::read_to_string(&path) {
                vars.insert(format!("{stem}_md"), content);
            }
        }
    }

    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_context_variables() {
        let mut ctx = HashMap::new();
        ctx.insert("title".to_string(), "Fix login".to_string());
        let out = render("# {{title}}", &ctx, &IndexMap::new(), None);
        assert_eq!(out, "# Fix login");
    }

    #[test]
    fn missing_variable_substitutes_empty() {
        let out = render("value: {{missing}}", &HashMap::new(), &IndexMap::new(), None);
        assert_eq!(out, "value: ");
    }

    #[test]
    fn only_referenced_commands_are_scanned() {
        let mut commands = IndexMap::new();
        commands.insert("git_branch".to_string(), CommandSpec::Single("echo main".to_string()));
        commands.insert("unused".to_string(), CommandSpec::Single("echo should-not-run".to_string()));
        let referenced = get_referenced_commands("branch: {{git_branch}}", &commands);
        assert_eq!(referenced, vec!["git_branch".to_string()]);
    }

    #[test]
    fn renders_command_output() {
        let mut commands = IndexMap::new();
        commands.insert("greeting".to_string(), CommandSpec::Single("echo hello".to_string()));
        let out = render("{{greeting}}", &HashMap::new(), &commands, None);
        assert_eq!(out, "hello");
    }

    #[test]
    fn issue_context_vars_embeds_sibling_markdown() {
        use agenttree_core::{Issue, Priority};
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("research.md"), "Found the root cause.").unwrap();
        let issue = Issue {
            id: "001".into(),
            slug: "demo".into(),
            title: "Demo".into(),
            created: "2026-01-01T00:00:00Z".into(),
            updated: "2026-01-01T00:00:00Z".into(),
            flow: "default".into(),
            stage: "plan".into(),
            substage: None,
            branch: None,
            worktree_dir: None,
            labels: vec![],
            priority: Priority::Medium,
            dependencies: vec![],
            github_issue: None,
            pr_number: None,
            pr_url: None,
            relevant_url: None,
            history: vec![],
            custom_agent_spawned: None,
            ci_escalated: false,
            processing: None,
            needs_push: false,
        };
        let vars = issue_context_vars(&issue, dir.path());
        assert_eq!(vars.get("research_md").unwrap(), "Found the root cause.");
        assert_eq!(vars.get("id").unwrap(), "001");
    }
}
