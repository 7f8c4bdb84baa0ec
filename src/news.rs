use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;

use crate::glossary::NewsLink;

/// Maximum links surfaced per term, authored or synthesized.
pub const NEWS_LIMIT: usize = 3;

static PARENTHETICAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[（(].*?[)）]").expect("parenthetical pattern compiles"));

pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

/// Query term for the provider searches: the display title with
/// parenthetical remarks removed, percent-encoded.
fn provider_query(title: &str) -> String {
    encode_component(PARENTHETICAL.replace_all(title, "").trim())
}

/// Search links for the three fixed providers.
pub fn synthesize(title: &str) -> Vec<NewsLink> {
    let qn = provider_query(title);
    vec![
        NewsLink {
            title: format!("Googleニュースで「{title}」"),
            url: format!("https://news.google.com/search?q={qn}&hl=ja&gl=JP&ceid=JP:ja"),
        },
        NewsLink {
            title: "Yahoo!ニュース検索".to_string(),
            url: format!("https://news.yahoo.co.jp/search?p={qn}"),
        },
        NewsLink {
            title: "共同通信（ニュース一覧・検索）".to_string(),
            url: format!("https://www.47news.jp/search?keyword={qn}"),
        },
    ]
}

/// Per-entry memo of synthesized news lists, keyed by entry index.
/// Entry data stays untouched; the cache owns every synthesized list
/// and hands out the same shared slice on every call.
pub struct NewsCache {
    inner: RwLock<HashMap<usize, Arc<[NewsLink]>>>,
}

impl NewsCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Bounded news list for one entry. Authored links win; otherwise
    /// the synthesized provider list is memoized under `index`.
    pub fn ensure(&self, index: usize, authored: &[NewsLink], title: &str) -> Arc<[NewsLink]> {
        if !authored.is_empty() {
            let capped: Vec<NewsLink> = authored.iter().take(NEWS_LIMIT).cloned().collect();
            return capped.into();
        }
        if let Some(cached) = self.inner.read().get(&index) {
            return Arc::clone(cached);
        }
        let mut guard = self.inner.write();
        let shared = guard.entry(index).or_insert_with(|| {
            let mut links = synthesize(title);
            links.truncate(NEWS_LIMIT);
            links.into()
        });
        Arc::clone(shared)
    }
}

impl Default for NewsCache {
    fn default() -> Self {
        Self::new()
    }
}
