//! Slug derivation, issue ID normalization, and dependency cycle detection.
//!
//! The store crate owns the on-disk dependency graph; this module owns the
//! pure graph algorithm so it can be unit tested without touching a
//! filesystem.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use crate::types::ID_PAD_WIDTH;

fn non_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s-]").unwrap())
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\s_]+").unwrap())
}

/// Convert arbitrary title text into a URL-friendly slug, capped at 50
/// characters, matching the original `slugify`.
pub fn slugify(text: &str) -> String {
    let lower = text.to_lowercase();
    let trimmed = lower.trim();
    let no_special = non_word_re().replace_all(trimmed, "");
    let hyphenated = whitespace_re().replace_all(&no_special, "-");
    let slug = hyphenated.trim_matches('-');
    slug.chars().take(50).collect()
}

/// Normalize a dependency/issue ID reference to its zero-padded canonical
/// form (`"7"` -> `"007"`, `"00"` -> `"000"`). Non-numeric input is left as
/// the literal digits parsed, defaulting to zero on no digits at all.
pub fn normalize_id(raw: &str) -> String {
    let stripped = raw.trim_start_matches('0');
    let n: u32 = if stripped.is_empty() { 0 } else { stripped.parse().unwrap_or(0) };
    format!("{:0width$}", n, width = ID_PAD_WIDTH)
}

/// Detect whether adding `new_dependencies` to `issue_id` would create a
/// cycle in the dependency graph. `existing_graph` maps every known issue's
/// normalized ID to its normalized dependency list. Returns the cycle path
/// (ending back at the repeated node) if one exists.
pub fn detect_circular_dependency(
    issue_id: &str,
    new_dependencies: &[String],
    existing_graph: &HashMap<String, Vec<String>>,
) -> Option<Vec<String>> {
    if new_dependencies.is_empty() {
        return None;
    }

    let normalized_id = normalize_id(issue_id);

    let mut graph: HashMap<String, Vec<String>> = existing_graph.clone();
    graph.insert(
        normalized_id.clone(),
        new_dependencies.iter().map(|d| normalize_id(d)).collect(),
    );

    let mut visited: HashSet<String> = HashSet::new();
    let mut path: Vec<String> = Vec::new();
    let mut path_set: HashSet<String> = HashSet::new();

    dfs(&normalized_id, &graph, &mut visited, &mut path, &mut path_set)
}

fn dfs(
    node: &str,
    graph: &HashMap<String, Vec<String>>,
    visited: &mut HashSet<String>,
    path: &mut Vec<String>,
    path_set: &mut HashSet<String>,
) -> Option<Vec<String>> {
    if path_set.contains(node) {
        let cycle_start = path.iter().position(|n| n == node).unwrap_or(0);
        let mut cycle: Vec<String> = path[cycle_start..].to_vec();
        cycle.push(node.to_string());
        return Some(cycle);
    }

    if visited.contains(node) {
        return None;
    }

    visited.insert(node.to_string());
    path.push(node.to_string());
    path_set.insert(node.to_string());

    if let Some(neighbors) = graph.get(node) {
        for neighbor in neighbors {
            if let Some(cycle) = dfs(neighbor, graph, visited, path, path_set) {
                return Some(cycle);
            }
        }
    }

    path.pop();
    path_set.remove(node);
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_lowercases_and_hyphenates() {
        assert_eq!(slugify("Fix Login Bug!"), "fix-login-bug");
        assert_eq!(slugify("  leading and trailing  "), "leading-and-trailing");
        assert_eq!(slugify("snake_case_words"), "snake-case-words");
    }

    #[test]
    fn slugify_caps_at_fifty_chars() {
        let long = "a".repeat(100);
        assert_eq!(slugify(&long).len(), 50);
    }

    #[test]
    fn normalize_id_pads_to_three_digits() {
        assert_eq!(normalize_id("7"), "007");
        assert_eq!(normalize_id("007"), "007");
        assert_eq!(normalize_id("00"), "000");
        assert_eq!(normalize_id("1000"), "1000");
    }

    #[test]
    fn detects_direct_cycle() {
        let mut graph = HashMap::new();
        graph.insert("002".to_string(), vec!["001".to_string()]);
        let cycle = detect_circular_dependency("001", &["002".to_string()], &graph);
        assert!(cycle.is_some());
        let cycle = cycle.unwrap();
        assert_eq!(cycle.first(), Some(&"001".to_string()));
        assert_eq!(cycle.last(), Some(&"001".to_string()));
    }

    #[test]
    fn no_cycle_for_acyclic_chain() {
        let mut graph = HashMap::new();
        graph.insert("003".to_string(), vec!["002".to_string()]);
        graph.insert("002".to_string(), vec![]);
        let cycle = detect_circular_dependency("001", &["003".to_string()], &graph);
        assert!(cycle.is_none());
    }

    #[test]
    fn empty_dependencies_never_cycle() {
        let graph = HashMap::new();
        assert!(detect_circular_dependency("001", &[], &graph).is_none());
    }
}
