use regex::Regex;
use tracing::warn;

use crate::glossary::Glossary;

/// One compiled matcher in an annotation pass: the entry's own pattern
/// when it compiles, otherwise the display title as an escaped literal.
pub struct TermMatcher {
    key: String,
    regex: Regex,
    title_chars: usize,
}

impl TermMatcher {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn title_chars(&self) -> usize {
        self.title_chars
    }
}

/// Builds the ordered matcher list for an annotation pass. Longer
/// display titles sort first so they claim contested spans before any
/// shorter term sees the text. Annotation matching is case-sensitive,
/// unlike query resolution.
pub fn build_matchers(glossary: &Glossary) -> Vec<TermMatcher> {
    let mut list: Vec<TermMatcher> = glossary
        .iter()
        .map(|term| {
            let regex = match term.pattern_source() {
                Some(source) => Regex::new(source).unwrap_or_else(|err| {
                    warn!(key = term.key(), error = %err, "invalid annotation pattern, using title literal");
                    literal(term.title())
                }),
                None => literal(term.title()),
            };
            TermMatcher {
                key: term.key().to_string(),
                regex,
                title_chars: term.title().chars().count(),
            }
        })
        .collect();
    list.sort_by(|a, b| b.title_chars.cmp(&a.title_chars));
    list
}

fn literal(title: &str) -> Regex {
    Regex::new(&regex::escape(title)).expect("escaped literal compiles")
}
