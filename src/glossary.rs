use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::news::NewsCache;
use crate::normalize::normalize;

/// One outbound news link, either authored in the dictionary or
/// synthesized from the fixed provider templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsLink {
    pub title: String,
    pub url: String,
}

/// Wire shape of a dictionary entry. Every field is optional; the key of
/// the enclosing JSON object doubles as the display title when `title`
/// is absent.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEntry {
    title: Option<String>,
    memo: Option<String>,
    who: Option<String>,
    topics: Vec<String>,
    pattern: Option<String>,
    news: Vec<NewsLink>,
}

#[derive(Debug)]
struct EntrySlot {
    key: String,
    normalized_key: String,
    title: String,
    memo: Option<String>,
    who: Option<String>,
    topics: Vec<String>,
    pattern_source: Option<String>,
    /// Case-insensitive lookup pattern, compiled once at load. `Err`
    /// keeps the reason so surfaces can report why the entry is skipped
    /// during pattern resolution.
    lookup_pattern: Option<Result<Regex, String>>,
    news: Vec<NewsLink>,
}

/// Read-only term dictionary plus the memo cache for synthesized news.
///
/// Entries come from an externally supplied JSON object keyed by term.
/// Iteration order is stable across calls but otherwise unspecified;
/// callers may only rely on "first hit" semantics during resolution.
pub struct Glossary {
    entries: Vec<EntrySlot>,
    by_key: HashMap<String, usize>,
    news_cache: NewsCache,
}

impl Glossary {
    pub fn from_json_str(json: &str) -> Result<Self, GlossaryError> {
        let raw: BTreeMap<String, RawEntry> = serde_json::from_str(json)?;
        Ok(Self::from_entries(raw))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, GlossaryError> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    fn from_entries(raw: BTreeMap<String, RawEntry>) -> Self {
        let mut entries = Vec::with_capacity(raw.len());
        let mut by_key = HashMap::with_capacity(raw.len());
        for (key, entry) in raw {
            let title = entry
                .title
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| key.clone());
            let lookup_pattern = entry.pattern.as_deref().map(|source| {
                RegexBuilder::new(source)
                    .case_insensitive(true)
                    .build()
                    .map_err(|err| {
                        warn!(key = %key, error = %err, "malformed entry pattern, skipping for lookup");
                        err.to_string()
                    })
            });
            by_key.insert(key.clone(), entries.len());
            entries.push(EntrySlot {
                normalized_key: normalize(&key),
                key,
                title,
                memo: entry.memo,
                who: entry.who,
                topics: entry.topics,
                pattern_source: entry.pattern,
                lookup_pattern,
                news: entry.news,
            });
        }
        Self {
            entries,
            by_key,
            news_cache: NewsCache::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact-key accessor.
    pub fn get(&self, key: &str) -> Option<TermRef<'_>> {
        self.by_key.get(key).map(|&index| self.term(index))
    }

    pub fn by_index(&self, index: usize) -> Option<TermRef<'_>> {
        self.entries.get(index).map(|slot| TermRef {
            glossary: self,
            slot,
            index,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = TermRef<'_>> {
        self.entries.iter().enumerate().map(|(index, slot)| TermRef {
            glossary: self,
            slot,
            index,
        })
    }

    /// Resolves a query to an entry: exact key first, then
    /// normalized-key equality, then the first entry whose lookup
    /// pattern matches the raw query or its normalized form.
    pub fn resolve(&self, query: &str) -> Option<TermRef<'_>> {
        if let Some(term) = self.get(query) {
            return Some(term);
        }
        let folded = normalize(query);
        for (index, slot) in self.entries.iter().enumerate() {
            if slot.normalized_key == folded {
                return Some(self.term(index));
            }
        }
        for (index, slot) in self.entries.iter().enumerate() {
            if let Some(Ok(pattern)) = &slot.lookup_pattern {
                if pattern.is_match(query) || pattern.is_match(&folded) {
                    return Some(self.term(index));
                }
            }
        }
        None
    }

    fn term(&self, index: usize) -> TermRef<'_> {
        TermRef {
            glossary: self,
            slot: &self.entries[index],
            index,
        }
    }
}

impl fmt::Debug for Glossary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Glossary")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Borrowed handle to one dictionary entry.
#[derive(Clone, Copy)]
pub struct TermRef<'a> {
    glossary: &'a Glossary,
    slot: &'a EntrySlot,
    index: usize,
}

impl<'a> TermRef<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn key(&self) -> &'a str {
        &self.slot.key
    }

    pub fn title(&self) -> &'a str {
        &self.slot.title
    }

    pub fn memo(&self) -> Option<&'a str> {
        self.slot.memo.as_deref()
    }

    pub fn who(&self) -> Option<&'a str> {
        self.slot.who.as_deref()
    }

    pub fn topics(&self) -> &'a [String] {
        &self.slot.topics
    }

    pub fn pattern_source(&self) -> Option<&'a str> {
        self.slot.pattern_source.as_deref()
    }

    pub fn pattern_error(&self) -> Option<&'a str> {
        match &self.slot.lookup_pattern {
            Some(Err(reason)) => Some(reason),
            _ => None,
        }
    }

    /// Authored news links, before any synthesis.
    pub fn authored_news(&self) -> &'a [NewsLink] {
        &self.slot.news
    }

    /// Bounded news list for this entry. Synthesized lists are memoized
    /// per entry, so repeated calls return the identical shared slice.
    pub fn news(&self) -> Arc<[NewsLink]> {
        self.glossary
            .news_cache
            .ensure(self.index, &self.slot.news, &self.slot.title)
    }
}

impl fmt::Debug for TermRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TermRef")
            .field("key", &self.slot.key)
            .field("title", &self.slot.title)
            .finish()
    }
}

#[derive(Debug)]
pub enum GlossaryError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for GlossaryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GlossaryError::Io(err) => write!(f, "failed to read glossary: {err}"),
            GlossaryError::Parse(err) => write!(f, "failed to parse glossary JSON: {err}"),
        }
    }
}

impl std::error::Error for GlossaryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GlossaryError::Io(err) => Some(err),
            GlossaryError::Parse(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for GlossaryError {
    fn from(err: std::io::Error) -> Self {
        GlossaryError::Io(err)
    }
}

impl From<serde_json::Error> for GlossaryError {
    fn from(err: serde_json::Error) -> Self {
        GlossaryError::Parse(err)
    }
}

#[cfg(test)]
pub(crate) fn sample_glossary() -> Glossary {
    Glossary::from_json_str(
        r#"{
            "物価": {
                "memo": "モノやサービスの値段の全体的な水準。",
                "who": "総務省統計局",
                "topics": ["経済", "くらし"],
                "pattern": "物価|インフレ|consumer price"
            },
            "円安": {
                "memo": "円の価値が他通貨に対して下がること。",
                "topics": ["経済"]
            },
            "ＧＤＰ": {
                "title": "GDP（国内総生産）",
                "memo": "国内で生み出された付加価値の合計。"
            },
            "日銀": {
                "title": "日本銀行",
                "who": "日本銀行",
                "news": [
                    { "title": "日銀公表資料", "url": "https://www.boj.or.jp/" }
                ]
            },
            "こわれた": {
                "pattern": "(unclosed"
            }
        }"#,
    )
    .expect("sample glossary parses")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_key_wins() {
        let glossary = sample_glossary();
        let term = glossary.resolve("物価").expect("exact hit");
        assert_eq!(term.key(), "物価");
        assert_eq!(term.title(), "物価");
        assert_eq!(term.who(), Some("総務省統計局"));
    }

    #[test]
    fn title_defaults_to_key() {
        let glossary = sample_glossary();
        assert_eq!(glossary.get("円安").unwrap().title(), "円安");
        assert_eq!(glossary.get("ＧＤＰ").unwrap().title(), "GDP（国内総生産）");
    }

    #[test]
    fn normalized_key_equality() {
        let glossary = sample_glossary();
        // Whitespace and width variants fold onto the stored key.
        let term = glossary.resolve("物 価").expect("normalized hit");
        assert_eq!(term.key(), "物価");
        let term = glossary.resolve("GDP").expect("width-folded hit");
        assert_eq!(term.key(), "ＧＤＰ");
    }

    #[test]
    fn pattern_matches_raw_and_normalized() {
        let glossary = sample_glossary();
        assert_eq!(glossary.resolve("インフレ").unwrap().key(), "物価");
        // Case-insensitive pattern against the raw query.
        assert_eq!(glossary.resolve("Consumer Price").unwrap().key(), "物価");
    }

    #[test]
    fn precedence_exact_over_normalized_over_pattern() {
        let glossary = Glossary::from_json_str(
            r#"{
                "金利": { "pattern": "利上げ" },
                "利上げ": { "memo": "政策金利の引き上げ。" },
                "利 上 げ": { "memo": "別表記。" }
            }"#,
        )
        .unwrap();
        // Exact key beats both the normalized twin and the other
        // entry's pattern.
        assert_eq!(glossary.resolve("利上げ").unwrap().key(), "利上げ");
        // With no exact hit, normalized equality beats the pattern.
        assert_eq!(glossary.resolve("利　上　げ").unwrap().key(), "利 上 げ");
    }

    #[test]
    fn malformed_pattern_is_skipped_not_fatal() {
        let glossary = sample_glossary();
        let term = glossary.get("こわれた").expect("entry still loads");
        assert!(term.pattern_error().is_some());
        // The broken pattern never matches anything.
        assert!(glossary.resolve("unclosed").is_none());
    }

    #[test]
    fn resolve_miss_returns_none() {
        let glossary = sample_glossary();
        assert!(glossary.resolve("存在しない用語").is_none());
        assert!(glossary.resolve("").is_none());
    }

    #[test]
    fn load_errors_are_typed() {
        let err = Glossary::from_json_str("not json").unwrap_err();
        assert!(matches!(err, GlossaryError::Parse(_)));
        let err = Glossary::from_path("/nonexistent/terms.json").unwrap_err();
        assert!(matches!(err, GlossaryError::Io(_)));
    }
}
