//! Highlighted context windows around query matches in page text.

use std::collections::HashSet;

use crate::morphology::{self, Morphology};

/// One run of characters, either a word or the separator between words.
struct Segment<'t> {
    text: &'t str,
    is_word: bool,
}

/// Case- and position-retaining split into alternating word/separator runs.
fn segment(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut current: Option<bool> = None;
    for (offset, c) in text.char_indices() {
        let is_word = morphology::is_word_char(c);
        match current {
            None => current = Some(is_word),
            Some(kind) if kind != is_word => {
                segments.push(Segment {
                    text: &text[start..offset],
                    is_word: kind,
                });
                start = offset;
                current = Some(is_word);
            }
            Some(_) => {}
        }
    }
    if let Some(kind) = current {
        segments.push(Segment {
            text: &text[start..],
            is_word: kind,
        });
    }
    segments
}

/// Build a snippet of `text` around the first occurrence of each query word.
///
/// A query word matches a text word when their normal forms intersect; each
/// query word is consumed by its first match. Every match gets a window of
/// `words_before` words of context before and `words_after` after; windows
/// that overlap or touch are merged, matched words are wrapped in `<b>`, and
/// disjoint windows are joined with `"..."`. No match yields an empty string.
pub fn build_snippet(
    morphology: &Morphology,
    text: &str,
    query_words: &[String],
    words_before: usize,
    words_after: usize,
) -> String {
    let segments = segment(text);
    let words: Vec<(usize, &str)> = segments
        .iter()
        .enumerate()
        .filter(|(_, segment)| segment.is_word)
        .map(|(index, segment)| (index, segment.text))
        .collect();
    if words.is_empty() {
        return String::new();
    }

    let mut pending: Vec<Vec<String>> = query_words
        .iter()
        .map(|word| morphology.word_forms(word))
        .filter(|forms| !forms.is_empty())
        .collect();

    // Word-list indices of matches, ascending by construction.
    let mut positions: Vec<usize> = Vec::new();
    for (word_index, (_, word)) in words.iter().enumerate() {
        if pending.is_empty() {
            break;
        }
        let forms = morphology.word_forms(word);
        if forms.is_empty() {
            continue;
        }
        let open = pending.len();
        pending.retain(|query_forms| !query_forms.iter().any(|form| forms.contains(form)));
        if pending.len() < open {
            positions.push(word_index);
        }
    }
    if positions.is_empty() {
        return String::new();
    }

    let last = words.len() - 1;
    let mut windows: Vec<(usize, usize)> = Vec::new();
    for &position in &positions {
        let window_start = position.saturating_sub(words_before);
        let window_end = (position + words_after).min(last);
        match windows.last_mut() {
            Some(open) if window_start <= open.1 + 1 => open.1 = open.1.max(window_end),
            _ => windows.push((window_start, window_end)),
        }
    }

    let matched: HashSet<usize> = positions.into_iter().collect();
    let mut rendered: Vec<String> = Vec::with_capacity(windows.len());
    for (first_word, last_word) in windows {
        let mut piece = String::new();
        let mut word_cursor = first_word;
        for segment in &segments[words[first_word].0..=words[last_word].0] {
            if segment.is_word {
                if matched.contains(&word_cursor) {
                    piece.push_str("<b>");
                    piece.push_str(segment.text);
                    piece.push_str("</b>");
                } else {
                    piece.push_str(segment.text);
                }
                word_cursor += 1;
            } else {
                piece.push_str(segment.text);
            }
        }
        rendered.push(piece);
    }
    rendered.join("...")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|word| word.to_string()).collect()
    }

    #[test]
    fn single_match_gets_one_window_without_ellipsis() {
        let morphology = Morphology::new();
        let snippet = build_snippet(
            &morphology,
            "Mama washed the frame. It was clean.",
            &words(&["wash"]),
            12,
            6,
        );
        assert_eq!(snippet, "Mama <b>washed</b> the frame. It was clean");
        assert!(!snippet.contains("..."));
    }

    #[test]
    fn distant_matches_render_as_joined_windows() {
        let morphology = Morphology::new();
        let text = "one pebble two three four five granite eight";
        let snippet = build_snippet(&morphology, text, &words(&["pebble", "granite"]), 1, 1);
        assert_eq!(snippet, "one <b>pebble</b> two...five <b>granite</b> eight");
    }

    #[test]
    fn touching_windows_merge_into_one() {
        let morphology = Morphology::new();
        let text = "start granite pebble finish";
        let snippet = build_snippet(&morphology, text, &words(&["granite", "pebble"]), 0, 0);
        assert_eq!(snippet, "<b>granite</b> <b>pebble</b>");
    }

    #[test]
    fn each_query_word_is_consumed_by_its_first_match() {
        let morphology = Morphology::new();
        let text = "granite here and granite there";
        let snippet = build_snippet(&morphology, text, &words(&["granite"]), 0, 0);
        assert_eq!(snippet, "<b>granite</b>");
    }

    #[test]
    fn no_match_yields_empty_snippet() {
        let morphology = Morphology::new();
        let snippet = build_snippet(&morphology, "nothing relevant here", &words(&["granite"]), 12, 6);
        assert_eq!(snippet, "");
    }

    #[test]
    fn match_keeps_the_original_casing() {
        let morphology = Morphology::new();
        let snippet = build_snippet(&morphology, "Granite looks solid.", &words(&["granite"]), 2, 2);
        assert_eq!(snippet, "<b>Granite</b> looks solid");
    }
}
