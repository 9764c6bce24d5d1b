//! English analyzer: function-word readings plus Porter-style inflection
//! stripping (plural, -ed/-ing, trailing-e cleanup).

use std::collections::HashMap;
use std::sync::LazyLock;

use super::{LanguageAnalyzer, PartOfSpeech, Reading};

const CONJUNCTIONS: &[&str] = &[
    "and", "or", "but", "nor", "so", "yet", "if", "than", "whether", "though", "although",
    "unless", "until", "once", "since", "while", "because", "whereas", "lest",
];

const PREPOSITIONS: &[&str] = &[
    "of", "in", "on", "at", "by", "for", "with", "about", "against", "between", "among",
    "into", "through", "during", "above", "below", "to", "from", "up", "down", "under",
    "over", "off", "near", "across", "behind", "beyond", "along", "around", "upon",
    "within", "without", "toward", "towards", "onto", "despite", "per", "via", "amid",
    "beneath", "beside", "besides", "except", "inside", "outside", "underneath", "past",
];

const PARTICLES: &[&str] = &["not"];

const ARTICLES: &[&str] = &["a", "an", "the"];

const INTERJECTIONS: &[&str] = &[
    "oh", "ah", "wow", "hey", "ouch", "oops", "hmm", "alas", "hurrah", "yeah", "huh",
    "uh", "um", "er", "phew", "psst", "yikes",
];

/// Function words with an ordinary content homograph (verb, noun, adverb).
const CONTENT_DUALS: &[&str] = &[
    "like", "near", "down", "up", "off", "so", "but", "while", "since", "past", "round",
];

static FUNCTION_WORDS: LazyLock<HashMap<&'static str, Vec<PartOfSpeech>>> = LazyLock::new(|| {
    let groups: [(&[&str], PartOfSpeech); 6] = [
        (CONJUNCTIONS, PartOfSpeech::Conjunction),
        (PREPOSITIONS, PartOfSpeech::Preposition),
        (PARTICLES, PartOfSpeech::Particle),
        (ARTICLES, PartOfSpeech::Article),
        (INTERJECTIONS, PartOfSpeech::Interjection),
        (CONTENT_DUALS, PartOfSpeech::Content),
    ];
    let mut table: HashMap<&'static str, Vec<PartOfSpeech>> = HashMap::new();
    for (words, tag) in groups {
        for &word in words {
            table.entry(word).or_default().push(tag);
        }
    }
    table
});

pub struct English;

impl LanguageAnalyzer for English {
    fn matches_alphabet(&self, word: &str) -> bool {
        !word.is_empty()
            && word.chars().all(|c| c.is_ascii_lowercase() || c == '-')
            && word.chars().any(|c| c != '-')
    }

    fn readings(&self, word: &str) -> Vec<Reading> {
        if let Some(tags) = FUNCTION_WORDS.get(word) {
            return tags
                .iter()
                .map(|&tag| Reading {
                    normal_form: if tag.is_content() { stem(word) } else { word.to_string() },
                    part_of_speech: tag,
                })
                .collect();
        }
        vec![Reading {
            normal_form: stem(word),
            part_of_speech: PartOfSpeech::Content,
        }]
    }
}

fn is_consonant(w: &[u8], i: usize) -> bool {
    match w[i] {
        b'a' | b'e' | b'i' | b'o' | b'u' => false,
        b'y' => i == 0 || !is_consonant(w, i - 1),
        _ => true,
    }
}

/// Porter's m: the number of vowel-consonant sequences in the stem.
fn measure(w: &[u8]) -> usize {
    let n = w.len();
    let mut m = 0;
    let mut i = 0;
    while i < n && is_consonant(w, i) {
        i += 1;
    }
    loop {
        while i < n && !is_consonant(w, i) {
            i += 1;
        }
        if i == n {
            break;
        }
        while i < n && is_consonant(w, i) {
            i += 1;
        }
        m += 1;
        if i == n {
            break;
        }
    }
    m
}

fn contains_vowel(w: &[u8]) -> bool {
    (0..w.len()).any(|i| !is_consonant(w, i))
}

fn ends_double_consonant(w: &[u8]) -> bool {
    let n = w.len();
    n >= 2 && w[n - 1] == w[n - 2] && is_consonant(w, n - 1)
}

/// Porter's *o: stem ends consonant-vowel-consonant, last not w, x, or y.
fn ends_cvc(w: &[u8]) -> bool {
    let n = w.len();
    n >= 3
        && is_consonant(w, n - 3)
        && !is_consonant(w, n - 2)
        && is_consonant(w, n - 1)
        && !matches!(w[n - 1], b'w' | b'x' | b'y')
}

/// Porter steps 1a, 1b, 1c, 5a, and 5b: inflectional endings only. The
/// derivational steps are deliberately omitted; index and query text share
/// this function, so matching stays symmetric.
pub(super) fn stem(word: &str) -> String {
    if word.len() <= 2 {
        return word.to_string();
    }
    let mut w = word.to_string();

    // Step 1a: plurals.
    if w.ends_with("sses") || w.ends_with("ies") {
        let new_len = w.len() - 2;
        w.truncate(new_len);
    } else if w.ends_with('s') && !w.ends_with("ss") {
        let new_len = w.len() - 1;
        w.truncate(new_len);
    }

    // Step 1b: -eed, -ed, -ing.
    if w.ends_with("eed") {
        if measure(&w.as_bytes()[..w.len() - 3]) > 0 {
            let new_len = w.len() - 1;
            w.truncate(new_len);
        }
    } else {
        let stripped = if w.ends_with("ed") && contains_vowel(&w.as_bytes()[..w.len() - 2]) {
            let new_len = w.len() - 2;
            w.truncate(new_len);
            true
        } else if w.ends_with("ing") && contains_vowel(&w.as_bytes()[..w.len() - 3]) {
            let new_len = w.len() - 3;
            w.truncate(new_len);
            true
        } else {
            false
        };
        if stripped {
            if w.ends_with("at") || w.ends_with("bl") || w.ends_with("iz") {
                w.push('e');
            } else if ends_double_consonant(w.as_bytes())
                && !matches!(w.as_bytes()[w.len() - 1], b'l' | b's' | b'z')
            {
                w.pop();
            } else if measure(w.as_bytes()) == 1 && ends_cvc(w.as_bytes()) {
                w.push('e');
            }
        }
    }

    // Step 1c: terminal y after a vowel becomes i.
    if w.ends_with('y') && contains_vowel(&w.as_bytes()[..w.len() - 1]) {
        w.pop();
        w.push('i');
    }

    // Step 5a: drop a terminal e unless the stem is too short to spare it.
    if w.ends_with('e') {
        let stem_part = &w.as_bytes()[..w.len() - 1];
        let m = measure(stem_part);
        if m > 1 || (m == 1 && !ends_cvc(stem_part)) {
            w.pop();
        }
    }

    // Step 5b: undouble a terminal ll.
    if w.ends_with("ll") && measure(w.as_bytes()) > 1 {
        w.pop();
    }

    w
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inflection_families_share_a_stem() {
        assert_eq!(stem("washed"), "wash");
        assert_eq!(stem("washes"), "wash");
        assert_eq!(stem("washing"), "wash");
        assert_eq!(stem("wash"), "wash");
        assert_eq!(stem("frames"), "frame");
        assert_eq!(stem("framing"), "frame");
        assert_eq!(stem("frame"), "frame");
        assert_eq!(stem("ponies"), "poni");
        assert_eq!(stem("pony"), "poni");
    }

    #[test]
    fn short_words_and_doubles() {
        assert_eq!(stem("mama"), "mama");
        assert_eq!(stem("hopping"), "hop");
        assert_eq!(stem("caress"), "caress");
        assert_eq!(stem("agreed"), stem("agree"));
    }

    #[test]
    fn function_words_filtered_duals_kept() {
        let en = English;
        assert!(
            en.readings("the")
                .iter()
                .all(|r| !r.part_of_speech.is_content())
        );
        assert!(
            en.readings("like")
                .iter()
                .any(|r| r.part_of_speech.is_content())
        );
    }

    #[test]
    fn alphabet_is_ascii_lowercase() {
        let en = English;
        assert!(en.matches_alphabet("frame"));
        assert!(en.matches_alphabet("well-known"));
        assert!(!en.matches_alphabet("мама"));
        assert!(!en.matches_alphabet("r2d2"));
    }
}
