// ABOUTME: Line-oriented diff between two artifact texts
// ABOUTME: Classifies key/value changes as modifications and renders a bounded preview

use serde::{Deserialize, Serialize};

/// Maximum number of lines kept in a diff preview
pub const MAX_PREVIEW_LINES: usize = 50;

/// Sentinel summary for identical texts
pub const NO_CHANGES: &str = "No changes detected";

/// A line whose key stayed the same while its value changed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModifiedLine {
    pub before: String,
    pub after: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffResult {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<ModifiedLine>,
    pub preview: String,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

enum Entry<'a> {
    Same(&'a str),
    Removed(&'a str),
    Added(&'a str),
}

impl Entry<'_> {
    fn is_change(&self) -> bool {
        !matches!(self, Entry::Same(_))
    }

    fn render(&self) -> String {
        match self {
            Entry::Same(line) => format!("  {}", line),
            Entry::Removed(line) => format!("- {}", line),
            Entry::Added(line) => format!("+ {}", line),
        }
    }
}

/// The portion of a line before its first `:`, if it names a key
fn key_of(line: &str) -> Option<&str> {
    let (key, _) = line.split_once(':')?;
    if key.trim().is_empty() {
        None
    } else {
        Some(key)
    }
}

/// Compare two texts line by line with one cursor per side
pub fn generate_diff(original: &str, modified: &str) -> DiffResult {
    let before: Vec<&str> = original.lines().collect();
    let after: Vec<&str> = modified.lines().collect();

    let mut result = DiffResult::default();
    let mut entries = Vec::with_capacity(before.len().max(after.len()));

    let (mut i, mut j) = (0, 0);
    while i < before.len() && j < after.len() {
        let (old, new) = (before[i], after[j]);
        if old == new {
            entries.push(Entry::Same(old));
        } else {
            match (key_of(old), key_of(new)) {
                (Some(a), Some(b)) if a == b => {
                    result.modified.push(ModifiedLine {
                        before: old.to_string(),
                        after: new.to_string(),
                    });
                }
                _ => {
                    result.removed.push(old.to_string());
                    result.added.push(new.to_string());
                }
            }
            entries.push(Entry::Removed(old));
            entries.push(Entry::Added(new));
        }
        i += 1;
        j += 1;
    }

    for old in &before[i..] {
        result.removed.push(old.to_string());
        entries.push(Entry::Removed(old));
    }
    for new in &after[j..] {
        result.added.push(new.to_string());
        entries.push(Entry::Added(new));
    }

    result.preview = render_preview(&entries);
    result
}

fn render_preview(entries: &[Entry<'_>]) -> String {
    let mut keep = vec![false; entries.len()];
    for (idx, entry) in entries.iter().enumerate() {
        if entry.is_change() {
            keep[idx] = true;
            if idx > 0 {
                keep[idx - 1] = true;
            }
            if idx + 1 < entries.len() {
                keep[idx + 1] = true;
            }
        }
    }

    let lines: Vec<String> = entries
        .iter()
        .zip(keep)
        .filter(|(_, keep)| *keep)
        .map(|(entry, _)| entry.render())
        .collect();

    if lines.len() <= MAX_PREVIEW_LINES {
        return lines.join("\n");
    }

    let hidden = lines.len() - (MAX_PREVIEW_LINES - 1);
    let mut shown = lines[..MAX_PREVIEW_LINES - 1].to_vec();
    shown.push(format!("... {} more lines", hidden));
    shown.join("\n")
}

fn count_phrase(count: usize, singular: &str, plural: &str) -> Option<String> {
    match count {
        0 => None,
        1 => Some(format!("1 {}", singular)),
        n => Some(format!("{} {}", n, plural)),
    }
}

/// Short human-readable rendering of the diff counts
pub fn generate_change_summary(diff: &DiffResult) -> String {
    let parts: Vec<String> = [
        count_phrase(diff.added.len(), "addition", "additions"),
        count_phrase(diff.removed.len(), "removal", "removals"),
        count_phrase(diff.modified.len(), "modification", "modifications"),
    ]
    .into_iter()
    .flatten()
    .collect();

    if parts.is_empty() {
        NO_CHANGES.to_string()
    } else {
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("")]
    #[case("openapi: 3.0.3\ninfo:\n  title: Todo\n")]
    #[case("a\n\nb\n\n")]
    fn test_identical_texts_have_no_changes(#[case] text: &str) {
        let diff = generate_diff(text, text);
        assert!(diff.is_empty());
        assert_eq!(diff.preview, "");
        assert_eq!(generate_change_summary(&diff), NO_CHANGES);
    }

    #[test]
    fn test_changed_value_is_a_modification() {
        let diff = generate_diff(
            "info:\n  title: Todo\n  version: 1.0.0\n",
            "info:\n  title: Todo\n  version: 1.1.0\n",
        );

        assert_eq!(
            diff.modified,
            vec![ModifiedLine {
                before: "  version: 1.0.0".to_string(),
                after: "  version: 1.1.0".to_string(),
            }]
        );
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
        assert_eq!(generate_change_summary(&diff), "1 modification");
    }

    #[test]
    fn test_different_keys_are_remove_and_add() {
        let diff = generate_diff("  summary: List\n", "  description: List\n");
        assert_eq!(diff.removed, vec!["  summary: List"]);
        assert_eq!(diff.added, vec!["  description: List"]);
        assert!(diff.modified.is_empty());
    }

    #[test]
    fn test_indentation_is_part_of_the_key() {
        let diff = generate_diff("title: A\n", "  title: B\n");
        assert!(diff.modified.is_empty());
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.added.len(), 1);
    }

    #[test]
    fn test_trailing_lines_are_pure_adds_or_removes() {
        let diff = generate_diff("a: 1\n", "a: 1\nb: 2\nc: 3\n");
        assert_eq!(diff.added, vec!["b: 2", "c: 3"]);
        assert_eq!(generate_change_summary(&diff), "2 additions");

        let diff = generate_diff("a: 1\nb: 2\n", "a: 1\n");
        assert_eq!(diff.removed, vec!["b: 2"]);
        assert_eq!(generate_change_summary(&diff), "1 removal");
    }

    #[test]
    fn test_preview_keeps_one_line_of_context() {
        let diff = generate_diff(
            "one: 1\ntwo: 2\nthree: 3\nfour: 4\nfive: 5\n",
            "one: 1\ntwo: 2\nthree: 33\nfour: 4\nfive: 5\n",
        );

        assert_eq!(diff.preview, "  two: 2\n- three: 3\n+ three: 33\n  four: 4");
    }

    #[test]
    fn test_preview_is_capped() {
        let before: String = (0..100).map(|i| format!("k{}: {}\n", i, i)).collect();
        let after: String = (0..100).map(|i| format!("k{}: {}\n", i, i + 1)).collect();

        let diff = generate_diff(&before, &after);
        let lines: Vec<&str> = diff.preview.lines().collect();

        assert_eq!(diff.modified.len(), 100);
        assert_eq!(lines.len(), MAX_PREVIEW_LINES);
        assert_eq!(lines[MAX_PREVIEW_LINES - 1], "... 151 more lines");
        assert_eq!(generate_change_summary(&diff), "100 modifications");
    }

    #[test]
    fn test_mixed_summary() {
        let diff = generate_diff("a: 1\nb: 2\nx\n", "a: 9\ny\nx\nz: 1\n");
        assert_eq!(
            generate_change_summary(&diff),
            "2 additions, 1 removal, 1 modification"
        );
    }
}
