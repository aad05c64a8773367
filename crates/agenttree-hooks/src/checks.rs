//! Markdown/YAML content checks backing `section_check`, `field_check`,
//! and `has_list_items` (spec §4.6).

use agenttree_config::SectionExpect;

/// Find a Markdown section by heading text (any `#` level) and return its
/// body — everything up to the next heading at the same or shallower
/// level.
pub fn section_body<'a>(markdown: &'a str, section: &str) -> Option<&'a str> {
    let lines: Vec<&str> = markdown.lines().collect();
    let mut start_idx = None;
    let mut start_level = 0usize;

    for (i, line) in lines.iter().enumerate() {
        if let Some((level, title)) = heading(line) {
            if title.eq_ignore_ascii_case(section.trim()) {
                start_idx = Some(i);
                start_level = level;
                break;
            }
        }
    }

    let start_idx = start_idx?;
    let body_start = line_byte_offset(markdown, start_idx + 1);

    let mut end_idx = lines.len();
    for (i, line) in lines.iter().enumerate().skip(start_idx + 1) {
        if let Some((level, _)) = heading(line) {
            if level <= start_level {
                end_idx = i;
                break;
            }
        }
    }
    let body_end = line_byte_offset(markdown, end_idx);

    Some(&markdown[body_start..body_end])
}

fn heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = trimmed[level..].trim();
    if rest.is_empty() {
        None
    } else {
        Some((level, rest))
    }
}

fn line_byte_offset(text: &str, line_idx: usize) -> usize {
    text.lines().take(line_idx).map(|l| l.len() + 1).sum::<usize>().min(text.len())
}

pub fn check_section(markdown: &str, section: &str, expect: SectionExpect) -> bool {
    let body = section_body(markdown, section).unwrap_or("");
    let trimmed = body.trim();
    match expect {
        SectionExpect::NotEmpty => !trimmed.is_empty(),
        SectionExpect::Empty => trimmed.is_empty(),
        SectionExpect::AllChecked => {
            let items: Vec<&str> = body
                .lines()
                .map(|l| l.trim_start())
                .filter(|l| l.starts_with("- [") || l.starts_with("* ["))
                .collect();
            !items.is_empty() && items.iter().all(|l| l.to_lowercase().contains("[x]"))
        }
    }
}

pub fn list_item_count(markdown: &str, section: &str) -> usize {
    let body = section_body(markdown, section).unwrap_or("");
    body.lines()
        .map(|l| l.trim_start())
        .filter(|l| l.starts_with("- ") || l.starts_with("* ") || (l.starts_with("- [") || l.starts_with("* [")))
        .count()
}

/// Locate the first fenced ```yaml block and follow `path` (dot-separated
/// keys) to a numeric leaf, comparing it against `min`.
pub fn field_at_least(markdown: &str, path: &str, min: f64) -> Option<bool> {
    let block = fenced_yaml_block(markdown)?;
    let value: serde_yaml::Value = serde_yaml::from_str(&block).ok()?;
    let mut cursor = &value;
    for key in path.split('.') {
        cursor = cursor.get(key)?;
    }
    let num = cursor.as_f64()?;
    Some(num >= min)
}

fn fenced_yaml_block(markdown: &str) -> Option<String> {
    let mut lines = markdown.lines();
    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        if trimmed == "```yaml" || trimmed == "```yml" {
            let mut body = String::new();
            for line in lines.by_ref() {
                if line.trim() == "```" {
                    return Some(body);
                }
                body.push_str(line);
                body.push('\n');
            }
            return Some(body);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_body_extracts_between_headings() {
        let md = "# Title\n\n## Problem\nSomething is broken.\n\n## Context\nMore text.\n";
        let body = section_body(md, "Problem").unwrap();
        assert!(body.contains("Something is broken."));
        assert!(!body.contains("More text."));
    }

    #[test]
    fn not_empty_expectation() {
        let md = "## Problem\nSomething.\n";
        assert!(check_section(md, "Problem", SectionExpect::NotEmpty));
        let empty = "## Problem\n\n## Next\nstuff\n";
        assert!(!check_section(empty, "Problem", SectionExpect::NotEmpty));
    }

    #[test]
    fn all_checked_requires_every_item_checked() {
        let md = "## Checklist\n- [x] one\n- [x] two\n";
        assert!(check_section(md, "Checklist", SectionExpect::AllChecked));
        let partial = "## Checklist\n- [x] one\n- [ ] two\n";
        assert!(!check_section(partial, "Checklist", SectionExpect::AllChecked));
    }

    #[test]
    fn all_checked_false_when_no_items() {
        let md = "## Checklist\n\n";
        assert!(!check_section(md, "Checklist", SectionExpect::AllChecked));
    }

    #[test]
    fn list_item_count_counts_bullets() {
        let md = "## Solutions\n- one\n- two\n- three\n";
        assert_eq!(list_item_count(md, "Solutions"), 3);
    }

    #[test]
    fn field_at_least_reads_fenced_yaml() {
        let md = "# Review\n\n```yaml\nscore:\n  overall: 8\n```\n";
        assert_eq!(field_at_least(md, "score.overall", 7.0), Some(true));
        assert_eq!(field_at_least(md, "score.overall", 9.0), Some(false));
    }
}
