use std::sync::Arc;

use crate::annotate::Marker;
use crate::dom::{DomNode, Element};
use crate::glossary::{Glossary, NewsLink};
use crate::news::encode_component;

/// Path of the term detail view, used by the card's "see more" link.
pub const DETAIL_PATH: &str = "/term";

/// Rendered state of one explanation card.
#[derive(Debug, Clone)]
pub struct Card {
    key: String,
    title: String,
    memo: Option<String>,
    news: Arc<[NewsLink]>,
}

impl Card {
    /// Resolves `query` and assembles the card contents for it.
    pub fn build(glossary: &Glossary, query: &str) -> Option<Self> {
        let term = glossary.resolve(query)?;
        let memo = term
            .memo()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        Some(Self {
            key: query.to_string(),
            title: term.title().to_string(),
            memo,
            news: term.news(),
        })
    }

    /// The query the card was opened with, used for the detail link.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn memo(&self) -> Option<&str> {
        self.memo.as_deref()
    }

    pub fn news(&self) -> &[NewsLink] {
        &self.news
    }

    /// Card fragment: title, optional memo, bounded news list and the
    /// single navigating "see more" link.
    pub fn to_element(&self) -> Element {
        let mut card = Element::new("div");
        card.set_attr("class", "explain-card");

        let mut title = Element::new("div");
        title.set_attr("class", "explain-title");
        title.children.push(DomNode::text(&self.title));
        card.children.push(DomNode::Element(title));

        if let Some(memo_text) = &self.memo {
            let mut memo = Element::new("div");
            memo.set_attr("class", "explain-memo");
            memo.children.push(DomNode::text(memo_text));
            card.children.push(DomNode::Element(memo));
        }

        let mut head = Element::new("div");
        head.set_attr("class", "tip-news-head");
        head.children.push(DomNode::text("最近のニュース"));
        card.children.push(DomNode::Element(head));

        let mut list = Element::new("ul");
        list.set_attr("class", "explain-news");
        for link in self.news.iter() {
            let mut anchor = Element::new("a");
            anchor.set_attr("href", &link.url);
            anchor.set_attr("target", "_blank");
            anchor.set_attr("rel", "noopener");
            let label = if link.title.is_empty() {
                &link.url
            } else {
                &link.title
            };
            anchor.children.push(DomNode::text(label));
            let mut item = Element::new("li");
            item.children.push(DomNode::Element(anchor));
            list.children.push(DomNode::Element(item));
        }
        card.children.push(DomNode::Element(list));

        let mut more = Element::new("a");
        more.set_attr("class", "explain-more");
        more.set_attr(
            "href",
            format!("{DETAIL_PATH}?q={}", encode_component(&self.key)),
        );
        more.children.push(DomNode::text("詳しく見る →"));
        card.children.push(DomNode::Element(more));

        card
    }

    pub fn to_html(&self) -> String {
        self.to_element().to_html()
    }
}

/// Single-open card state machine. Marker clicks toggle or replace the
/// open card; outside clicks and escape close it.
#[derive(Debug, Default)]
pub struct CardController {
    open: Option<(usize, Card)>,
}

impl CardController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Click on a produced marker. Toggles the marker's own card,
    /// otherwise resolves it and replaces whatever card is open. An
    /// unresolvable marker changes nothing.
    pub fn click_marker(&mut self, glossary: &Glossary, marker: &Marker) {
        if let Some((open_index, _)) = &self.open {
            if *open_index == marker.index {
                self.open = None;
                return;
            }
        }
        let query = if marker.key.is_empty() {
            marker.text.trim()
        } else {
            &marker.key
        };
        if let Some(card) = Card::build(glossary, query) {
            self.open = Some((marker.index, card));
        }
    }

    pub fn click_outside(&mut self) {
        self.open = None;
    }

    pub fn escape(&mut self) {
        self.open = None;
    }

    pub fn open_marker(&self) -> Option<usize> {
        self.open.as_ref().map(|(index, _)| *index)
    }

    pub fn open_card(&self) -> Option<&Card> {
        self.open.as_ref().map(|(_, card)| card)
    }
}
