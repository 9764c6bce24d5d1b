//! HTML analysis: weighted lemma extraction, content fingerprints, and link
//! discovery with the crawl-side filters.

use std::collections::HashMap;

use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use url::Url;

use super::robots::RobotsPolicy;
use crate::indexer::WeightedLemma;
use crate::morphology::Morphology;
use crate::storage::models::FieldRule;

/// Substrings that disqualify a discovered link outright.
const FORBIDDEN_COMPONENTS: [&str; 4] = ["#", "mailto:", "tel:", "javascript:"];

/// Everything a page task needs from one parsed document.
#[derive(Debug)]
pub struct PageAnalysis {
    pub lemmas: Vec<WeightedLemma>,
    pub fingerprint: String,
    /// Absolute, percent-decoded hrefs in document order; unfiltered.
    pub links: Vec<String>,
}

/// Parse the body once: harvest links from the intact tree, then extract
/// weighted lemmas per field rule. Non-primary fields are detached after
/// their own extraction so nested selectors are not counted twice by `body`.
pub fn analyze_page(
    morphology: &Morphology,
    field_rules: &[FieldRule],
    page_url: &str,
    body: &str,
) -> PageAnalysis {
    let mut html = Html::parse_document(body);
    let links = harvest_links(&html, page_url);
    detach_all(&mut html, "script, style");

    let mut accumulated: HashMap<String, (f64, i64)> = HashMap::new();
    for rule in field_rules {
        let selector = match Selector::parse(&rule.selector) {
            Ok(selector) => selector,
            Err(err) => {
                tracing::warn!(field = %rule.name, %err, "unparseable field selector, skipping");
                continue;
            }
        };
        let text = selected_text(&html, &selector);
        for (lemma, count) in morphology.normalize(&text) {
            let slot = accumulated.entry(lemma).or_insert((0.0, 0));
            slot.0 += count as f64 * rule.weight;
            slot.1 += count as i64;
        }
        if rule.name != "title" && rule.name != "body" {
            detach_selected(&mut html, &selector);
        }
    }

    let mut lemmas: Vec<WeightedLemma> = accumulated
        .into_iter()
        .map(|(lemma, (rank, count))| WeightedLemma { lemma, rank, count })
        .collect();
    lemmas.sort_by(|a, b| a.lemma.cmp(&b.lemma));
    let fingerprint = fingerprint_of(&lemmas);

    PageAnalysis {
        lemmas,
        fingerprint,
        links,
    }
}

/// SHA-256 over the sorted `lemma:count` multiset. Ranks are deliberately
/// excluded: a field-weight change alone must not force a re-index.
pub fn fingerprint_of(lemmas: &[WeightedLemma]) -> String {
    let mut hasher = Sha256::new();
    for lemma in lemmas {
        hasher.update(lemma.lemma.as_bytes());
        hasher.update(b":");
        hasher.update(lemma.count.to_string().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// The document title, whitespace-normalized. Empty when absent.
pub fn page_title(content: &str) -> String {
    let html = Html::parse_document(content);
    match Selector::parse("title") {
        Ok(selector) => selected_text(&html, &selector),
        Err(_) => String::new(),
    }
}

/// Visible body text with scripts and styles stripped, whitespace collapsed
/// to single spaces. Case and punctuation survive for snippet building.
pub fn page_body_text(content: &str) -> String {
    let mut html = Html::parse_document(content);
    detach_all(&mut html, "script, style");
    match Selector::parse("body") {
        Ok(selector) => selected_text(&html, &selector),
        Err(_) => String::new(),
    }
}

fn selected_text(html: &Html, selector: &Selector) -> String {
    let mut chunks: Vec<&str> = Vec::new();
    for element in html.select(selector) {
        chunks.extend(element.text());
    }
    let joined = chunks.join(" ");
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn detach_all(html: &mut Html, selector: &str) {
    if let Ok(selector) = Selector::parse(selector) {
        detach_selected(html, &selector);
    }
}

fn detach_selected(html: &mut Html, selector: &Selector) {
    let ids: Vec<_> = html.select(selector).map(|element| element.id()).collect();
    for id in ids {
        if let Some(mut node) = html.tree.get_mut(id) {
            node.detach();
        }
    }
}

fn harvest_links(html: &Html, page_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let mut links = Vec::new();
    for element in html.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if let Ok(resolved) = base.join(href) {
            links.push(decode_link(resolved.as_str()));
        }
    }
    links
}

/// Percent-decode a link the way it will be stored and compared. Undecodable
/// bytes leave the link unchanged.
pub fn decode_link(link: &str) -> String {
    match urlencoding::decode(link) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => link.to_string(),
    }
}

/// The stored page path: the URL with the site prefix removed, `/` for the
/// site root itself.
pub fn page_path(url: &str, site_url: &str) -> String {
    match url.strip_prefix(site_url) {
        Some("") | Some("/") => "/".to_string(),
        Some(rest) => rest.to_string(),
        None => url.to_string(),
    }
}

/// Apply the stateless link filters; the caller handles visited bookkeeping.
pub fn filter_links(
    candidates: Vec<String>,
    site_url: &str,
    robots: &RobotsPolicy,
    current_year: i32,
) -> Vec<String> {
    candidates
        .into_iter()
        .filter(|link| {
            link.starts_with(site_url)
                && !contains_forbidden_component(link)
                && year_in_acceptable_range(link, current_year)
                && robots.is_allowed(link)
        })
        .collect()
}

fn contains_forbidden_component(link: &str) -> bool {
    FORBIDDEN_COMPONENTS
        .iter()
        .any(|component| link.contains(component))
}

/// Links carrying a `year=` parameter are kept only when the four characters
/// after it form a year within [current − 10, current + 3]. Catalogue sites
/// generate archives decades deep; this keeps the crawl out of them.
fn year_in_acceptable_range(link: &str, current_year: i32) -> bool {
    if !link.contains('?') {
        return true;
    }
    let lower = link.to_lowercase();
    let Some(position) = lower.find("year=") else {
        return true;
    };
    let start = position + 5;
    let Some(slice) = lower.get(start..start + 4) else {
        return false;
    };
    match slice.parse::<i32>() {
        Ok(year) => (current_year - 10..=current_year + 3).contains(&year),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn rules() -> Vec<FieldRule> {
        vec![
            FieldRule {
                name: "title".to_string(),
                selector: "title".to_string(),
                weight: 1.0,
            },
            FieldRule {
                name: "body".to_string(),
                selector: "body".to_string(),
                weight: 0.8,
            },
        ]
    }

    const PAGE: &str = indoc! {r##"
        <html>
        <head><title>Mama mala ramu</title></head>
        <body>
            <p>Mama mala ramu.</p>
            <a href="/page">next</a>
            <a href="mailto:mama@example.com">mail</a>
            <a href="#top">top</a>
            <script>var mama = "mama";</script>
        </body>
        </html>
    "##};

    #[test]
    fn title_and_body_weights_accumulate() {
        let morphology = Morphology::new();
        let analysis = analyze_page(&morphology, &rules(), "https://example.com/", PAGE);

        let mama = analysis
            .lemmas
            .iter()
            .find(|l| l.lemma == "mama")
            .expect("mama lemma");
        // one title occurrence at 1.0 plus one body occurrence at 0.8;
        // the script text is stripped before extraction.
        assert_eq!(mama.count, 2);
        assert!((mama.rank - 1.8).abs() < 1e-9);
    }

    #[test]
    fn fingerprint_tracks_counts_not_ranks() {
        let a = vec![WeightedLemma {
            lemma: "mama".to_string(),
            rank: 1.8,
            count: 2,
        }];
        let b = vec![WeightedLemma {
            lemma: "mama".to_string(),
            rank: 0.9,
            count: 2,
        }];
        let c = vec![WeightedLemma {
            lemma: "mama".to_string(),
            rank: 1.8,
            count: 3,
        }];
        assert_eq!(fingerprint_of(&a), fingerprint_of(&b));
        assert_ne!(fingerprint_of(&a), fingerprint_of(&c));
    }

    #[test]
    fn links_resolve_against_the_page_url() {
        let morphology = Morphology::new();
        let analysis = analyze_page(&morphology, &rules(), "https://example.com/dir/", PAGE);
        assert!(
            analysis
                .links
                .contains(&"https://example.com/page".to_string())
        );
        assert!(
            analysis
                .links
                .contains(&"mailto:mama@example.com".to_string())
        );
    }

    #[test]
    fn non_primary_fields_are_not_double_counted() {
        let mut field_rules = rules();
        field_rules.insert(
            0,
            FieldRule {
                name: "heading".to_string(),
                selector: "h1".to_string(),
                weight: 2.0,
            },
        );
        let page = "<html><head><title>x</title></head>\
                    <body><h1>Mama</h1><p>ramu</p></body></html>";
        let morphology = Morphology::new();
        let analysis = analyze_page(&morphology, &field_rules, "https://example.com/", page);

        let mama = analysis
            .lemmas
            .iter()
            .find(|l| l.lemma == "mama")
            .expect("mama lemma");
        // counted once in h1 (weight 2.0), not again in body.
        assert_eq!(mama.count, 1);
        assert!((mama.rank - 2.0).abs() < 1e-9);
    }

    #[test]
    fn forbidden_and_offsite_links_filtered() {
        let robots = RobotsPolicy::allow_all();
        let survivors = filter_links(
            vec![
                "https://example.com/page".to_string(),
                "https://example.com/page#section".to_string(),
                "mailto:mama@example.com".to_string(),
                "tel:+1234567".to_string(),
                "javascript:void(0)".to_string(),
                "https://other.org/page".to_string(),
            ],
            "https://example.com",
            &robots,
            2026,
        );
        assert_eq!(survivors, vec!["https://example.com/page".to_string()]);
    }

    #[test]
    fn year_window_is_relative_to_current_year() {
        let robots = RobotsPolicy::allow_all();
        let keep = |link: &str| {
            !filter_links(vec![link.to_string()], "https://example.com", &robots, 2026).is_empty()
        };
        assert!(keep("https://example.com/archive?year=2020"));
        assert!(keep("https://example.com/archive?year=2016"));
        assert!(keep("https://example.com/archive?year=2029"));
        assert!(!keep("https://example.com/archive?year=2015"));
        assert!(!keep("https://example.com/archive?year=2030"));
        assert!(!keep("https://example.com/archive?year=20"));
        assert!(!keep("https://example.com/archive?year=twenty"));
        assert!(keep("https://example.com/year=1999"));
    }

    #[test]
    fn page_path_strips_site_prefix() {
        assert_eq!(page_path("https://example.com", "https://example.com"), "/");
        assert_eq!(
            page_path("https://example.com/", "https://example.com"),
            "/"
        );
        assert_eq!(
            page_path("https://example.com/a/b?x=1", "https://example.com"),
            "/a/b?x=1"
        );
    }

    #[test]
    fn decode_link_tolerates_raw_percent() {
        assert_eq!(
            decode_link("https://example.com/%D0%BC%D0%B0%D0%BC%D0%B0"),
            "https://example.com/мама"
        );
        assert_eq!(
            decode_link("https://example.com/100%region"),
            "https://example.com/100%region"
        );
    }
}
