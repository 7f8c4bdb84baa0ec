use scraper::{ElementRef, Html, Node};

/// Elements serialized without a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose text content is emitted verbatim.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Owned HTML node. The parsed page is converted into this tree once,
/// mutated freely, then serialized back to HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomNode {
    Element(Element),
    Text(String),
}

impl DomNode {
    pub fn text(content: impl Into<String>) -> Self {
        DomNode::Text(content.into())
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            DomNode::Element(el) => Some(el),
            DomNode::Text(_) => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            DomNode::Element(el) => Some(el),
            DomNode::Text(_) => None,
        }
    }
}

/// Element node: tag, attributes in document order, children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<DomNode>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name, value)),
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|v| v.split_ascii_whitespace().any(|c| c == class))
    }

    /// Concatenated text of the subtree.
    pub fn collect_text(&self) -> String {
        let mut buf = String::new();
        collect_text_inner(self, &mut buf);
        buf
    }

    /// First element in document order matching `pred`, including self.
    pub fn find(&self, pred: &dyn Fn(&Element) -> bool) -> Option<&Element> {
        if pred(self) {
            return Some(self);
        }
        for child in &self.children {
            if let DomNode::Element(el) = child {
                if let Some(found) = el.find(pred) {
                    return Some(found);
                }
            }
        }
        None
    }

    pub fn find_mut(&mut self, pred: &dyn Fn(&Element) -> bool) -> Option<&mut Element> {
        if pred(self) {
            return Some(self);
        }
        for child in &mut self.children {
            if let DomNode::Element(el) = child {
                if let Some(found) = el.find_mut(pred) {
                    return Some(found);
                }
            }
        }
        None
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Element> {
        self.find(&|el| el.attr("id") == Some(id))
    }

    pub fn find_by_id_mut(&mut self, id: &str) -> Option<&mut Element> {
        self.find_mut(&|el| el.attr("id") == Some(id))
    }

    pub fn find_by_tag_mut(&mut self, tag: &str) -> Option<&mut Element> {
        self.find_mut(&|el| el.tag == tag)
    }

    /// Serializes the subtree back to HTML.
    pub fn to_html(&self) -> String {
        let mut buf = String::new();
        write_element(self, &mut buf);
        buf
    }
}

fn collect_text_inner(el: &Element, buf: &mut String) {
    for child in &el.children {
        match child {
            DomNode::Text(text) => buf.push_str(text),
            DomNode::Element(child_el) => collect_text_inner(child_el, buf),
        }
    }
}

/// Parses an HTML document into an owned tree rooted at `<html>`.
pub fn parse(html: &str) -> Element {
    let document = Html::parse_document(html);
    convert_element(document.root_element())
}

fn convert_element(el: ElementRef<'_>) -> Element {
    let tag = el.value().name.local.as_ref().to_string();
    let attrs: Vec<(String, String)> = el
        .value()
        .attrs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let mut children = Vec::new();
    for child_ref in el.children() {
        match child_ref.value() {
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child_ref) {
                    children.push(DomNode::Element(convert_element(child_el)));
                }
            }
            Node::Text(t) => children.push(DomNode::Text(t.text.to_string())),
            _ => {}
        }
    }

    Element {
        tag,
        attrs,
        children,
    }
}

/// Subtree the annotation and search passes run under: the element
/// with id `article` when present, otherwise `body`, otherwise the
/// document itself.
pub fn article_root(document: &mut Element) -> &mut Element {
    if document.find_by_id("article").is_some() {
        return document
            .find_by_id_mut("article")
            .expect("article element present");
    }
    if document.find(&|el| el.tag == "body").is_some() {
        return document
            .find_by_tag_mut("body")
            .expect("body element present");
    }
    document
}

/// Serializes a whole document with its doctype.
pub fn to_document_html(root: &Element) -> String {
    let mut buf = String::from("<!DOCTYPE html>\n");
    write_element(root, &mut buf);
    buf
}

fn write_element(el: &Element, buf: &mut String) {
    buf.push('<');
    buf.push_str(&el.tag);
    for (name, value) in &el.attrs {
        buf.push(' ');
        buf.push_str(name);
        buf.push_str("=\"");
        buf.push_str(&attr_escape(value));
        buf.push('"');
    }
    buf.push('>');
    if VOID_ELEMENTS.contains(&el.tag.as_str()) {
        return;
    }
    let raw_text = RAW_TEXT_ELEMENTS.contains(&el.tag.as_str());
    for child in &el.children {
        match child {
            DomNode::Text(text) => {
                if raw_text {
                    buf.push_str(text);
                } else {
                    buf.push_str(&text_escape(text));
                }
            }
            DomNode::Element(child_el) => write_element(child_el, buf),
        }
    }
    buf.push_str("</");
    buf.push_str(&el.tag);
    buf.push('>');
}

/// Walks text nodes in document order and lets `rewrite` replace each
/// one with a node sequence. Elements matched by `skip` are not
/// entered, so nothing below them is rewritten. `rewrite` returns
/// `None` to leave a text node untouched.
pub fn rewrite_text_nodes(
    el: &mut Element,
    skip: &dyn Fn(&Element) -> bool,
    rewrite: &mut dyn FnMut(&str) -> Option<Vec<DomNode>>,
) {
    if skip(el) {
        return;
    }
    let children = std::mem::take(&mut el.children);
    let mut rebuilt = Vec::with_capacity(children.len());
    for mut child in children {
        match child {
            DomNode::Text(text) => match rewrite(&text) {
                Some(nodes) => rebuilt.extend(nodes),
                None => rebuilt.push(DomNode::Text(text)),
            },
            DomNode::Element(ref mut child_el) => {
                rewrite_text_nodes(child_el, skip, rewrite);
                rebuilt.push(child);
            }
        }
    }
    el.children = rebuilt;
}

fn text_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn attr_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keeps_attribute_and_child_order() {
        let root = parse(r#"<html><body><p id="a" class="x">前<b>中</b>後</p></body></html>"#);
        let p = root.find_by_id("a").expect("p element");
        assert_eq!(p.tag, "p");
        assert_eq!(p.attrs[0], ("id".to_string(), "a".to_string()));
        assert_eq!(p.attrs[1], ("class".to_string(), "x".to_string()));
        assert_eq!(p.collect_text(), "前中後");
    }

    #[test]
    fn serializer_round_trips_structure() {
        let root = parse("<html><body><p>物価の<em>話</em></p></body></html>");
        let body = root.find(&|el| el.tag == "body").unwrap();
        assert_eq!(body.to_html(), "<body><p>物価の<em>話</em></p></body>");
    }

    #[test]
    fn text_and_attributes_are_escaped() {
        let mut el = Element::new("span");
        el.set_attr("data-key", "a\"b&c");
        el.children.push(DomNode::text("1 < 2 & 3"));
        assert_eq!(
            el.to_html(),
            r#"<span data-key="a&quot;b&amp;c">1 &lt; 2 &amp; 3</span>"#
        );
    }

    #[test]
    fn void_elements_have_no_closing_tag() {
        let root = parse(r#"<html><body>a<br>b<img src="x.png"></body></html>"#);
        let body = root.find(&|el| el.tag == "body").unwrap();
        assert_eq!(body.to_html(), r#"<body>a<br>b<img src="x.png"></body>"#);
    }

    #[test]
    fn script_and_style_text_stays_verbatim() {
        let root = parse("<html><head><style>p > em { color: red; }</style></head><body></body></html>");
        let style = root.find(&|el| el.tag == "style").unwrap();
        assert_eq!(style.to_html(), "<style>p > em { color: red; }</style>");
    }

    #[test]
    fn has_class_splits_on_whitespace() {
        let mut el = Element::new("mark");
        el.set_attr("class", "hl current");
        assert!(el.has_class("hl"));
        assert!(el.has_class("current"));
        assert!(!el.has_class("cur"));
    }

    #[test]
    fn set_attr_overwrites_in_place() {
        let mut el = Element::new("span");
        el.set_attr("class", "gloss-term");
        el.set_attr("class", "gloss-term open");
        assert_eq!(el.attrs.len(), 1);
        assert_eq!(el.attr("class"), Some("gloss-term open"));
    }
}
