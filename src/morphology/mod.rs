//! Language-aware normalization of raw text into lemma occurrence counts.

mod english;
mod russian;

pub use english::English;
pub use russian::Russian;

use std::collections::HashMap;

/// Part-of-speech tag attached to a word reading. Everything except
/// `Content` marks a function word that carries no search value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartOfSpeech {
    Conjunction,
    Interjection,
    Preposition,
    Particle,
    Article,
    Content,
}

impl PartOfSpeech {
    pub fn is_content(self) -> bool {
        matches!(self, PartOfSpeech::Content)
    }
}

/// One reading of a word: its normal form and the part of speech.
#[derive(Debug, Clone)]
pub struct Reading {
    pub normal_form: String,
    pub part_of_speech: PartOfSpeech,
}

/// Per-language analysis seam. Analyzers are stateless and shared across
/// crawl workers.
pub trait LanguageAnalyzer: Send + Sync {
    /// Whether the word is spelled entirely in this language's alphabet
    /// (letters plus interior hyphens).
    fn matches_alphabet(&self, word: &str) -> bool;

    /// All readings of the word. Function words come from static tables;
    /// anything else gets a single content reading of its normal form.
    fn readings(&self, word: &str) -> Vec<Reading>;
}

/// The morphology engine. Pure: no interior state, safe to share behind an
/// `Arc` between every crawl worker and the search path.
pub struct Morphology {
    /// Analyzers in priority order; the first whose alphabet matches a
    /// token analyzes it.
    analyzers: Vec<Box<dyn LanguageAnalyzer>>,
}

impl Default for Morphology {
    fn default() -> Self {
        Self::new()
    }
}

impl Morphology {
    pub fn new() -> Self {
        Self {
            analyzers: vec![Box::new(Russian), Box::new(English)],
        }
    }

    /// Normalize text into a map of lemma to occurrence count.
    ///
    /// Tokens are lowercased runs of letters, digits, and interior hyphens.
    /// A token whose readings are all non-content is dropped; a token made
    /// entirely of digits is kept verbatim; a token matching no analyzer's
    /// alphabet is dropped. Each surviving token contributes one count to
    /// every distinct normal form it has.
    pub fn normalize(&self, text: &str) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for token in tokenize(text) {
            for form in self.forms_of(&token) {
                *counts.entry(form).or_insert(0) += 1;
            }
        }
        counts
    }

    /// The distinct normal forms of one word, empty when the word would be
    /// dropped by `normalize`. Query parsing and snippet matching use this.
    pub fn word_forms(&self, word: &str) -> Vec<String> {
        match tokenize(word).into_iter().next() {
            Some(token) => self.forms_of(&token),
            None => Vec::new(),
        }
    }

    fn forms_of(&self, token: &str) -> Vec<String> {
        if token.chars().all(|c| c.is_ascii_digit()) {
            return vec![token.to_string()];
        }
        for analyzer in &self.analyzers {
            if !analyzer.matches_alphabet(token) {
                continue;
            }
            let readings = analyzer.readings(token);
            if readings.iter().all(|r| !r.part_of_speech.is_content()) {
                return Vec::new();
            }
            let mut forms: Vec<String> = readings.into_iter().map(|r| r.normal_form).collect();
            forms.sort();
            forms.dedup();
            return forms;
        }
        Vec::new()
    }
}

fn is_token_char(c: char) -> bool {
    matches!(c, 'a'..='z' | '0'..='9' | 'а'..='я' | 'ё' | '-')
}

/// Split text into words keeping their original case. Same token rules as
/// `normalize`; used where output must quote the user's own words.
pub fn split_words(text: &str) -> Vec<String> {
    text.split(|c: char| !is_word_char(c))
        .map(|piece| piece.trim_matches('-'))
        .filter(|piece| !piece.is_empty())
        .map(|piece| piece.to_string())
        .collect()
}

/// Case-insensitive test for characters that belong to a word. The snippet
/// builder segments page text with this so its words line up with
/// `split_words`.
pub(crate) fn is_word_char(c: char) -> bool {
    c.to_lowercase().next().is_some_and(is_token_char)
}

/// Split lowercased text into candidate tokens. Standalone hyphens are
/// separators; interior ones ("из-за", "well-known") are kept.
fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    lowered
        .split(|c| !is_token_char(c))
        .map(|piece| piece.trim_matches('-'))
        .filter(|piece| !piece.is_empty())
        .map(|piece| piece.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts_of(pairs: &[(&str, usize)]) -> HashMap<String, usize> {
        pairs
            .iter()
            .map(|(lemma, count)| (lemma.to_string(), *count))
            .collect()
    }

    #[test]
    fn normalizes_russian_sentence() {
        let morphology = Morphology::new();
        let counts = morphology.normalize("Мама мыла раму");
        assert_eq!(counts, counts_of(&[("мам", 1), ("мыл", 1), ("рам", 1)]));
    }

    #[test]
    fn normalizes_english_sentence_dropping_function_words() {
        let morphology = Morphology::new();
        let counts = morphology.normalize("Mama washed the frame");
        assert_eq!(counts, counts_of(&[("mama", 1), ("wash", 1), ("frame", 1)]));
    }

    #[test]
    fn repeated_words_accumulate() {
        let morphology = Morphology::new();
        let counts = morphology.normalize("Mama, mama and the frame");
        assert_eq!(counts, counts_of(&[("mama", 2), ("frame", 1)]));
    }

    #[test]
    fn digit_tokens_kept_verbatim() {
        let morphology = Morphology::new();
        let counts = morphology.normalize("31 июня");
        assert_eq!(counts, counts_of(&[("31", 1), ("июн", 1)]));
    }

    #[test]
    fn mixed_alphabet_tokens_dropped() {
        let morphology = Morphology::new();
        assert!(morphology.normalize("r2d2 αβγ 2023-2024").is_empty());
    }

    #[test]
    fn punctuation_only_text_yields_nothing() {
        let morphology = Morphology::new();
        assert!(morphology.normalize("!!! ... --- ?!").is_empty());
    }

    #[test]
    fn hyphenated_function_word_dropped_content_kept() {
        let morphology = Morphology::new();
        let counts = morphology.normalize("Из-за острого изжога!");
        assert_eq!(counts, counts_of(&[("остр", 1), ("изжог", 1)]));
    }

    #[test]
    fn word_forms_mirror_normalize_decisions() {
        let morphology = Morphology::new();
        assert_eq!(morphology.word_forms("Washed,"), vec!["wash".to_string()]);
        assert!(morphology.word_forms("the").is_empty());
        assert!(morphology.word_forms("и").is_empty());
        assert_eq!(morphology.word_forms("2023"), vec!["2023".to_string()]);
        assert!(morphology.word_forms("").is_empty());
    }

    #[test]
    fn standalone_hyphens_are_separators() {
        let tokens = tokenize("физ - ра и из-за");
        assert_eq!(tokens, vec!["физ", "ра", "и", "из-за"]);
    }

    #[test]
    fn split_words_keeps_case() {
        let words = split_words("Mama washed the Frame.");
        assert_eq!(words, vec!["Mama", "washed", "the", "Frame"]);
    }
}
