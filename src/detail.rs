use std::sync::Arc;

use crate::glossary::{Glossary, NewsLink};

pub const NOT_FOUND_TITLE: &str = "用語情報が見つかりません";
pub const NOT_FOUND_MEMO: &str = "用語辞書に追加してください。";
pub const WHO_UNSET: &str = "（情報未設定）";

/// Resolved contents of the term detail view. The fixed page regions
/// (title, memo, authority line, topic list, news list) are computed
/// here; rendering is left to the delivery surface.
#[derive(Debug, Clone)]
pub enum DetailPage {
    NotFound,
    Found {
        title: String,
        memo: String,
        who_line: String,
        topics: Vec<String>,
        news: Arc<[NewsLink]>,
    },
}

impl DetailPage {
    /// Resolves `query` with the usual precedence. An empty or
    /// whitespace-only query is a miss without consulting the
    /// dictionary.
    pub fn resolve(glossary: &Glossary, query: &str) -> Self {
        if query.trim().is_empty() {
            return DetailPage::NotFound;
        }
        match glossary.resolve(query) {
            None => DetailPage::NotFound,
            Some(term) => DetailPage::Found {
                title: term.title().to_string(),
                memo: term.memo().unwrap_or_default().to_string(),
                who_line: match term.who() {
                    Some(who) => format!("担当・所管：{who}"),
                    None => WHO_UNSET.to_string(),
                },
                topics: term.topics().to_vec(),
                news: term.news(),
            },
        }
    }

    pub fn title(&self) -> &str {
        match self {
            DetailPage::NotFound => NOT_FOUND_TITLE,
            DetailPage::Found { title, .. } => title,
        }
    }

    pub fn memo(&self) -> &str {
        match self {
            DetailPage::NotFound => NOT_FOUND_MEMO,
            DetailPage::Found { memo, .. } => memo,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, DetailPage::Found { .. })
    }
}
