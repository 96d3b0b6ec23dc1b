//! # Shared Text Matching
//!
//! Normalization, keyword-list scanning, the negation guard, and windowed
//! history counting live here as the single source of truth. The predicate
//! library and the derived-metric calculator call these routines directly;
//! the generated script carries a helper prelude that mirrors them
//! one-for-one, so a fix in this module is only complete once the prelude
//! emission matches it again.
//!
//! ## Normalization
//!
//! Matching is ASCII case folding only. Both backends lowercase `A`..`Z`
//! and leave every other byte untouched, which keeps their results
//! byte-identical; locale-aware folding differs between runtimes and is
//! deliberately avoided.
//!
//! ## Negation guard
//!
//! A guarded match ignores occurrences directly preceded by a negation cue:
//! the [`NEGATION_WINDOW`] bytes before the occurrence, with trailing
//! spaces, tabs, and line breaks stripped, must not end in one of
//! [`NEGATION_CUES`] on a word boundary. "I do not love cats" fails a guarded `love` entry because
//! "not" is the word right before the occurrence, but it still matches a
//! guarded `cats` entry, and "cannot love" matches `love` because `cannot`
//! is one word.

use lazy_static::lazy_static;
use regex::Regex;

use crate::ast::ListEntry;

/// Bytes inspected before an occurrence when the negation guard is on.
pub const NEGATION_WINDOW: usize = 16;

/// Cue words that negate a following occurrence.
pub const NEGATION_CUES: &[&str] = &[
    "not", "no", "never", "don't", "dont", "won't", "wont", "can't", "cant", "without",
];

// Stripped from the window tail before the cue check. The generated
// script strips exactly the same four characters.
const WINDOW_TRIM: &[char] = &[' ', '\t', '\n', '\r'];

lazy_static! {
    // Matches a window whose trimmed tail is a cue word on a boundary.
    static ref CUE_AT_END: Regex = {
        let cues = NEGATION_CUES
            .iter()
            .map(|cue| regex::escape(cue))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"(?:^|[^a-z])(?:{})$", cues)).unwrap()
    };
}

/// Lowercases ASCII letters and nothing else.
pub fn normalize(text: &str) -> String {
    text.to_ascii_lowercase()
}

/// Returns the first list entry occurring in the haystack, in authored
/// entry order. The haystack must already be normalized; entries are
/// normalized here and empty entries never match.
pub fn find_any(entries: &[ListEntry], haystack: &str) -> Option<String> {
    for entry in entries {
        let needle = normalize(&entry.text);
        if needle.is_empty() {
            continue;
        }
        if haystack.contains(&needle) {
            return Some(needle);
        }
    }
    None
}

pub fn contains_any(entries: &[ListEntry], haystack: &str) -> bool {
    find_any(entries, haystack).is_some()
}

/// Like [`find_any`], but an occurrence only counts when it is not preceded
/// by a negation cue. An entry all of whose occurrences are negated does
/// not match; a later occurrence of the same entry can still match.
pub fn find_any_guarded(entries: &[ListEntry], haystack: &str) -> Option<String> {
    for entry in entries {
        let needle = normalize(&entry.text);
        if needle.is_empty() {
            continue;
        }
        if has_unnegated_occurrence(haystack, &needle) {
            return Some(needle);
        }
    }
    None
}

fn has_unnegated_occurrence(haystack: &str, needle: &str) -> bool {
    let mut from = 0;
    while let Some(offset) = haystack[from..].find(needle) {
        let at = from + offset;
        if !negated_at(haystack, at) {
            return true;
        }
        // Advance one character so overlapping occurrences are seen too.
        from = at + 1;
        while from < haystack.len() && !haystack.is_char_boundary(from) {
            from += 1;
        }
    }
    false
}

fn negated_at(haystack: &str, at: usize) -> bool {
    let mut start = at.saturating_sub(NEGATION_WINDOW);
    // The window is byte-based; nudge forward off a split code point.
    while !haystack.is_char_boundary(start) {
        start += 1;
    }
    let window = haystack[start..at].trim_end_matches(WINDOW_TRIM);
    CUE_AT_END.is_match(window)
}

/// Counts how many of the last `window` history entries contain at least
/// one list entry. A window of zero sees nothing; a window larger than the
/// history uses all of it.
pub fn count_in_window(entries: &[ListEntry], history: &[String], window: u32) -> u32 {
    if window == 0 {
        return 0;
    }
    let take = (window as usize).min(history.len());
    let start = history.len() - take;
    history[start..]
        .iter()
        .filter(|message| contains_any(entries, message))
        .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entries(texts: &[&str]) -> Vec<ListEntry> {
        texts.iter().map(|t| ListEntry::new(*t)).collect()
    }

    #[test]
    fn test_normalize_is_ascii_only() {
        assert_eq!(normalize("Hello CATS"), "hello cats");
        assert_eq!(normalize("Café CATS"), "café cats");
    }

    #[test]
    fn test_find_any_reports_first_entry_in_order() {
        let list = entries(&["dog", "cat"]);
        assert_eq!(find_any(&list, "a cat and a dog"), Some("dog".to_string()));
        assert_eq!(find_any(&list, "only a cat"), Some("cat".to_string()));
        assert_eq!(find_any(&list, "nothing here"), None);
    }

    #[test]
    fn test_empty_entries_never_match() {
        let list = entries(&["", "cat"]);
        assert_eq!(find_any(&list, "no pets at all"), None);
    }

    #[test]
    fn test_guard_blocks_directly_negated_occurrence() {
        let list = entries(&["love", "adore"]);
        assert_eq!(find_any_guarded(&list, "i do not love cats"), None);
        assert_eq!(find_any_guarded(&list, "i don't adore cats"), None);

        let list = entries(&["cats"]);
        assert_eq!(find_any_guarded(&list, "no cats"), None);
        assert_eq!(find_any_guarded(&list, "never   cats"), None);
        assert_eq!(find_any_guarded(&list, "a day without cats"), None);
    }

    #[test]
    fn test_guard_separators_are_plain_blanks_only() {
        let list = entries(&["cats"]);
        assert_eq!(find_any_guarded(&list, "no\tcats"), None);
        assert_eq!(find_any_guarded(&list, "no\ncats"), None);
        // Vertical tab and form feed are not separators, so the window
        // does not end in a bare cue and the occurrence stands.
        assert_eq!(
            find_any_guarded(&list, "no\u{b}cats"),
            Some("cats".to_string())
        );
        assert_eq!(
            find_any_guarded(&list, "no\u{c}cats"),
            Some("cats".to_string())
        );
    }

    #[test]
    fn test_guard_passes_plain_occurrence() {
        let list = entries(&["love", "adore"]);
        assert_eq!(
            find_any_guarded(&list, "i really love cats"),
            Some("love".to_string())
        );
    }

    #[test]
    fn test_guard_only_checks_word_directly_before() {
        // The cue must be the last word before the occurrence; a cue
        // farther back does not negate it.
        let list = entries(&["cats"]);
        assert_eq!(
            find_any_guarded(&list, "i do not love cats"),
            Some("cats".to_string())
        );
    }

    #[test]
    fn test_guard_requires_word_boundary_on_cue() {
        let list = entries(&["cats"]);
        // "cannot" and "knot" end in a cue spelling but are single words.
        assert_eq!(
            find_any_guarded(&list, "i cannot cats"),
            Some("cats".to_string())
        );
        assert_eq!(
            find_any_guarded(&list, "tie the knot cats"),
            Some("cats".to_string())
        );
    }

    #[test]
    fn test_guard_later_occurrence_still_matches() {
        let list = entries(&["cats"]);
        assert_eq!(
            find_any_guarded(&list, "not cats, but still cats after all"),
            Some("cats".to_string())
        );
    }

    #[test]
    fn test_guard_window_is_limited() {
        let list = entries(&["cats"]);
        // Whitespace wider than the window pushes the cue out of reach.
        assert_eq!(
            find_any_guarded(&list, "not                     cats"),
            Some("cats".to_string())
        );
        assert_eq!(find_any_guarded(&list, "not      cats"), None);
    }

    #[test]
    fn test_guard_handles_multibyte_neighbours() {
        let list = entries(&["cats"]);
        // Window boundary lands inside the accented run without panicking.
        assert_eq!(
            find_any_guarded(&list, "ééééééééé never cats"),
            None
        );
        assert_eq!(
            find_any_guarded(&list, "ééééééééééééééééé cats"),
            Some("cats".to_string())
        );
    }

    #[test]
    fn test_count_in_window_short_history() {
        let list = entries(&["cat"]);
        let history = vec![
            "a cat".to_string(),
            "a dog".to_string(),
            "another cat".to_string(),
        ];
        // Window wider than the history: every entry is inspected.
        assert_eq!(count_in_window(&list, &history, 8), 2);
        assert_eq!(count_in_window(&list, &history, 1), 1);
        assert_eq!(count_in_window(&list, &history, 0), 0);
    }

    #[test]
    fn test_count_in_window_counts_entries_not_occurrences() {
        let list = entries(&["cat"]);
        let history = vec!["cat cat cat".to_string()];
        assert_eq!(count_in_window(&list, &history, 5), 1);
    }
}
