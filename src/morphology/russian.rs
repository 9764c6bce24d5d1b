//! Russian analyzer: function-word readings plus a suffix-stripping stemmer.

use std::collections::HashMap;
use std::sync::LazyLock;

use super::{LanguageAnalyzer, PartOfSpeech, Reading};

const CONJUNCTIONS: &[&str] = &[
    "и", "а", "но", "да", "или", "либо", "ни", "то", "что", "чтоб", "чтобы", "как", "когда",
    "если", "хотя", "хоть", "зато", "однако", "тоже", "также", "будто", "словно", "пока",
    "едва", "лишь", "ибо", "причем", "нежели",
];

const PREPOSITIONS: &[&str] = &[
    "в", "во", "на", "за", "к", "ко", "с", "со", "из", "изо", "у", "о", "об", "обо", "от",
    "ото", "по", "под", "подо", "при", "про", "для", "до", "без", "безо", "через", "чрез",
    "над", "надо", "перед", "передо", "пред", "между", "меж", "сквозь", "среди", "вокруг",
    "возле", "около", "кроме", "ради", "вместо", "внутри", "вдоль", "мимо", "против",
    "согласно", "благодаря", "вопреки", "из-за", "из-под",
];

const PARTICLES: &[&str] = &[
    "не", "ни", "же", "ж", "ли", "ль", "бы", "б", "ведь", "вот", "вон", "даже", "лишь",
    "только", "уже", "уж", "разве", "неужели", "именно", "пусть", "пускай", "почти",
    "ровно", "просто", "прямо", "таки",
];

const INTERJECTIONS: &[&str] = &[
    "ах", "ох", "эх", "ой", "ай", "увы", "ура", "эй", "ну", "фу", "тьфу", "ого", "ага",
    "угу", "браво", "алло",
];

/// Function words that also carry an ordinary content reading (adverb or
/// noun homographs). These survive filtering because not every reading is
/// non-content.
const CONTENT_DUALS: &[&str] = &["просто", "прямо", "ровно", "пока", "уже", "вокруг", "около"];

static FUNCTION_WORDS: LazyLock<HashMap<&'static str, Vec<PartOfSpeech>>> = LazyLock::new(|| {
    let groups: [(&[&str], PartOfSpeech); 5] = [
        (CONJUNCTIONS, PartOfSpeech::Conjunction),
        (PREPOSITIONS, PartOfSpeech::Preposition),
        (PARTICLES, PartOfSpeech::Particle),
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

pub struct Russian;

impl LanguageAnalyzer for Russian {
    fn matches_alphabet(&self, word: &str) -> bool {
        !word.is_empty()
            && word.chars().all(|c| matches!(c, 'а'..='я' | 'ё' | '-'))
            && word.chars().any(|c| c != '-')
    }

    fn readings(&self, word: &str) -> Vec<Reading> {
        // ё folds to е for lookup and normal forms, as in classic search
        // analyzers.
        let word = word.replace('ё', "е");
        if let Some(tags) = FUNCTION_WORDS.get(word.as_str()) {
            return tags
                .iter()
                .map(|&tag| Reading {
                    normal_form: if tag.is_content() { stem(&word) } else { word.clone() },
                    part_of_speech: tag,
                })
                .collect();
        }
        vec![Reading {
            normal_form: stem(&word),
            part_of_speech: PartOfSpeech::Content,
        }]
    }
}

// Suffix tables for the classic Russian stemming algorithm. Entries are
// (pattern, cut): the pattern must end the word inside RV, and only the cut
// part is removed (for endings that require a preceding а/я, the vowel is
// matched but kept).

const PERFECTIVE_GERUND: &[(&str, &str)] = &[
    ("ившись", "ившись"),
    ("ывшись", "ывшись"),
    ("авшись", "вшись"),
    ("явшись", "вшись"),
    ("ивши", "ивши"),
    ("ывши", "ывши"),
    ("авши", "вши"),
    ("явши", "вши"),
    ("ив", "ив"),
    ("ыв", "ыв"),
    ("ав", "в"),
    ("яв", "в"),
];

const REFLEXIVE: &[(&str, &str)] = &[("ся", "ся"), ("сь", "сь")];

const ADJECTIVE: &[(&str, &str)] = &[
    ("ими", "ими"),
    ("ыми", "ыми"),
    ("его", "его"),
    ("ого", "ого"),
    ("ему", "ему"),
    ("ому", "ому"),
    ("ее", "ее"),
    ("ие", "ие"),
    ("ые", "ые"),
    ("ое", "ое"),
    ("ей", "ей"),
    ("ий", "ий"),
    ("ый", "ый"),
    ("ой", "ой"),
    ("ем", "ем"),
    ("им", "им"),
    ("ым", "ым"),
    ("ом", "ом"),
    ("их", "их"),
    ("ых", "ых"),
    ("ую", "ую"),
    ("юю", "юю"),
    ("ая", "ая"),
    ("яя", "яя"),
    ("ою", "ою"),
    ("ею", "ею"),
];

const PARTICIPLE: &[(&str, &str)] = &[
    ("ивш", "ивш"),
    ("ывш", "ывш"),
    ("ующ", "ующ"),
    ("аем", "ем"),
    ("яем", "ем"),
    ("анн", "нн"),
    ("янн", "нн"),
    ("авш", "вш"),
    ("явш", "вш"),
    ("ающ", "ющ"),
    ("яющ", "ющ"),
    ("ащ", "щ"),
    ("ящ", "щ"),
];

const VERB: &[(&str, &str)] = &[
    ("ила", "ила"),
    ("ыла", "ыла"),
    ("ена", "ена"),
    ("ейте", "ейте"),
    ("уйте", "уйте"),
    ("ите", "ите"),
    ("или", "или"),
    ("ыли", "ыли"),
    ("ей", "ей"),
    ("уй", "уй"),
    ("ил", "ил"),
    ("ыл", "ыл"),
    ("им", "им"),
    ("ым", "ым"),
    ("ен", "ен"),
    ("ило", "ило"),
    ("ыло", "ыло"),
    ("ено", "ено"),
    ("ят", "ят"),
    ("ует", "ует"),
    ("уют", "уют"),
    ("ит", "ит"),
    ("ыт", "ыт"),
    ("ены", "ены"),
    ("ить", "ить"),
    ("ыть", "ыть"),
    ("ишь", "ишь"),
    ("ую", "ую"),
    ("ю", "ю"),
    ("ала", "ла"),
    ("яла", "ла"),
    ("ана", "на"),
    ("яна", "на"),
    ("аете", "ете"),
    ("яете", "ете"),
    ("айте", "йте"),
    ("яйте", "йте"),
    ("али", "ли"),
    ("яли", "ли"),
    ("ай", "й"),
    ("яй", "й"),
    ("ал", "л"),
    ("ял", "л"),
    ("аем", "ем"),
    ("яем", "ем"),
    ("ан", "н"),
    ("ян", "н"),
    ("ало", "ло"),
    ("яло", "ло"),
    ("ано", "но"),
    ("яно", "но"),
    ("ает", "ет"),
    ("яет", "ет"),
    ("ают", "ют"),
    ("яют", "ют"),
    ("аны", "ны"),
    ("яны", "ны"),
    ("ать", "ть"),
    ("ять", "ть"),
    ("аешь", "ешь"),
    ("яешь", "ешь"),
    ("анно", "нно"),
    ("янно", "нно"),
];

const NOUN: &[(&str, &str)] = &[
    ("иями", "иями"),
    ("ями", "ями"),
    ("ами", "ами"),
    ("ией", "ией"),
    ("иям", "иям"),
    ("ием", "ием"),
    ("иях", "иях"),
    ("ев", "ев"),
    ("ов", "ов"),
    ("ие", "ие"),
    ("ье", "ье"),
    ("еи", "еи"),
    ("ии", "ии"),
    ("ей", "ей"),
    ("ой", "ой"),
    ("ий", "ий"),
    ("ям", "ям"),
    ("ем", "ем"),
    ("ам", "ам"),
    ("ом", "ом"),
    ("ах", "ах"),
    ("ях", "ях"),
    ("ию", "ию"),
    ("ью", "ью"),
    ("ия", "ия"),
    ("ья", "ья"),
    ("а", "а"),
    ("е", "е"),
    ("и", "и"),
    ("й", "й"),
    ("о", "о"),
    ("у", "у"),
    ("ы", "ы"),
    ("ь", "ь"),
    ("ю", "ю"),
    ("я", "я"),
];

const SUPERLATIVE: &[(&str, &str)] = &[("ейше", "ейше"), ("ейш", "ейш")];

const DERIVATIONAL: &[(&str, &str)] = &[("ость", "ость"), ("ост", "ост")];

const VOWELS: &[char] = &['а', 'е', 'и', 'о', 'у', 'ы', 'э', 'ю', 'я'];

fn is_vowel(c: char) -> bool {
    VOWELS.contains(&c)
}

/// Byte offset just past the first vowel; endings are only stripped after it.
fn rv_start(word: &str) -> usize {
    for (i, c) in word.char_indices() {
        if is_vowel(c) {
            return i + c.len_utf8();
        }
    }
    word.len()
}

/// Byte offset just past the first non-vowel that follows a vowel, starting
/// the scan at `from`.
fn region_after(word: &str, from: usize) -> usize {
    let mut seen_vowel = false;
    for (i, c) in word[from..].char_indices() {
        if is_vowel(c) {
            seen_vowel = true;
        } else if seen_vowel {
            return from + i + c.len_utf8();
        }
    }
    word.len()
}

/// Remove the cut of the longest pattern ending the word inside the region.
fn strip_longest(word: &mut String, region_start: usize, entries: &[(&str, &str)]) -> bool {
    let mut best: Option<(usize, usize)> = None;
    for &(pattern, cut) in entries {
        if word.len() < region_start + pattern.len() {
            continue;
        }
        if word.ends_with(pattern) && best.is_none_or(|(len, _)| pattern.len() > len) {
            best = Some((pattern.len(), cut.len()));
        }
    }
    match best {
        Some((_, cut_len)) => {
            let new_len = word.len() - cut_len;
            word.truncate(new_len);
            true
        }
        None => false,
    }
}

/// Heuristic normal form of a Russian content word (suffix analysis, not
/// dictionary lookup). Index and query text share this function, so matching
/// stays symmetric for inflected forms of the same stem.
pub(super) fn stem(word: &str) -> String {
    let mut w = word.replace('ё', "е");
    let rv = rv_start(&w);
    if rv >= w.len() {
        return w;
    }
    let r2 = region_after(&w, region_after(&w, 0));

    if !strip_longest(&mut w, rv, PERFECTIVE_GERUND) {
        strip_longest(&mut w, rv, REFLEXIVE);
        let mut stripped = false;
        if strip_longest(&mut w, rv, ADJECTIVE) {
            strip_longest(&mut w, rv, PARTICIPLE);
            stripped = true;
        }
        if !stripped {
            stripped = strip_longest(&mut w, rv, VERB);
        }
        if !stripped {
            strip_longest(&mut w, rv, NOUN);
        }
    }

    if w.len() >= rv + 2 && w.ends_with('и') {
        let new_len = w.len() - 2;
        w.truncate(new_len);
    }

    strip_longest(&mut w, r2, DERIVATIONAL);

    if w.len() >= rv + 4 && w.ends_with("нн") {
        let new_len = w.len() - 2;
        w.truncate(new_len);
    } else if strip_longest(&mut w, rv, SUPERLATIVE) {
        if w.len() >= rv + 4 && w.ends_with("нн") {
            let new_len = w.len() - 2;
            w.truncate(new_len);
        }
    } else if w.len() >= rv + 2 && w.ends_with('ь') {
        let new_len = w.len() - 2;
        w.truncate(new_len);
    }

    w
}
