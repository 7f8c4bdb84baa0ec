use std::time::{Duration, Instant};

use regex::RegexBuilder;

use crate::dom::{DomNode, Element, rewrite_text_nodes};

/// Ancestor class excluded from in-page search, on top of
/// `script`/`style`.
pub const SEARCH_EXCLUDED_CLASS: &str = "gloss-tooltip";

/// Keystroke settle time before a query is applied.
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(120);

/// In-page text search over one document subtree. The pristine tree is
/// kept aside; every query change rebuilds the highlighted rendering
/// from it, so stale highlights cannot survive.
pub struct SearchSession {
    pristine: Element,
    rendered: Element,
    query: String,
    hit_count: usize,
    cursor: Option<usize>,
}

impl SearchSession {
    pub fn new(root: Element) -> Self {
        Self {
            rendered: root.clone(),
            pristine: root,
            query: String::new(),
            hit_count: 0,
            cursor: None,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn hit_count(&self) -> usize {
        self.hit_count
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Applies a new query: tears down the previous rendering, wraps
    /// every case-insensitive literal hit in `<mark class="hl">` and
    /// puts the cursor on the first hit.
    pub fn set_query(&mut self, query: &str) {
        self.query = query.to_string();
        self.rendered = self.pristine.clone();
        self.hit_count = 0;
        self.cursor = None;
        if query.is_empty() {
            return;
        }
        let pattern = RegexBuilder::new(&regex::escape(query))
            .case_insensitive(true)
            .build()
            .expect("escaped literal compiles");
        let mut hits = 0usize;
        rewrite_text_nodes(&mut self.rendered, &excluded, &mut |text| {
            if text.trim().is_empty() {
                return None;
            }
            let sites: Vec<(usize, usize)> = pattern
                .find_iter(text)
                .map(|m| (m.start(), m.end()))
                .collect();
            if sites.is_empty() {
                return None;
            }
            let mut nodes = Vec::with_capacity(sites.len() * 2 + 1);
            let mut last = 0;
            for (start, end) in sites {
                if start > last {
                    nodes.push(DomNode::text(&text[last..start]));
                }
                nodes.push(DomNode::Element(mark_element(&text[start..end])));
                hits += 1;
                last = end;
            }
            if last < text.len() {
                nodes.push(DomNode::text(&text[last..]));
            }
            Some(nodes)
        });
        self.hit_count = hits;
        if hits > 0 {
            self.cursor = Some(0);
            self.apply_cursor();
        }
    }

    /// Moves the cursor to the next hit, wrapping past the last one.
    pub fn next(&mut self) {
        self.shift(1);
    }

    /// Moves the cursor to the previous hit, wrapping before the first.
    pub fn prev(&mut self) {
        self.shift(-1);
    }

    fn shift(&mut self, step: isize) {
        if let Some(cursor) = self.cursor {
            self.focus(cursor as isize + step);
        }
    }

    /// Puts the cursor on hit `i`, wrapping modulo the hit count. Does
    /// nothing without hits.
    pub fn focus(&mut self, i: isize) {
        if self.hit_count == 0 {
            return;
        }
        self.cursor = Some(i.rem_euclid(self.hit_count as isize) as usize);
        self.apply_cursor();
    }

    /// `"{i+1} / {n}"` with a cursor, `"0 件"` for a fruitless query,
    /// empty when idle.
    pub fn status(&self) -> String {
        if self.query.is_empty() {
            return String::new();
        }
        match self.cursor {
            Some(cursor) => format!("{} / {}", cursor + 1, self.hit_count),
            None => "0 件".to_string(),
        }
    }

    /// Current highlighted rendering.
    pub fn html(&self) -> String {
        self.rendered.to_html()
    }

    fn apply_cursor(&mut self) {
        let cursor = self.cursor;
        let mut index = 0usize;
        restyle_marks(&mut self.rendered, &mut |mark| {
            let class = if Some(index) == cursor {
                "hl current"
            } else {
                "hl"
            };
            mark.set_attr("class", class);
            index += 1;
        });
    }
}

fn excluded(el: &Element) -> bool {
    el.has_class(SEARCH_EXCLUDED_CLASS) || el.tag == "script" || el.tag == "style"
}

fn mark_element(text: &str) -> Element {
    let mut mark = Element::new("mark");
    mark.set_attr("class", "hl");
    mark.children.push(DomNode::text(text));
    mark
}

fn restyle_marks(el: &mut Element, visit: &mut dyn FnMut(&mut Element)) {
    for child in &mut el.children {
        if let DomNode::Element(child_el) = child {
            if child_el.tag == "mark" && child_el.has_class("hl") {
                visit(child_el);
            } else {
                restyle_marks(child_el, visit);
            }
        }
    }
}

/// Last-write-wins keystroke debouncer. A new submission supersedes
/// the pending one; polling past the deadline yields the latest query
/// exactly once.
#[derive(Debug, Default)]
pub struct Debouncer {
    pending: Option<(String, Instant)>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&mut self, query: &str, now: Instant) {
        self.pending = Some((query.to_string(), now + SEARCH_DEBOUNCE));
    }

    pub fn poll(&mut self, now: Instant) -> Option<String> {
        match &self.pending {
            Some((_, deadline)) if *deadline <= now => self.pending.take().map(|(query, _)| query),
            _ => None,
        }
    }
}
