use crate::dom::{DomNode, Element, rewrite_text_nodes};
use crate::matcher::TermMatcher;
use crate::splice::{Fragment, splice};

/// Class carried by every produced term marker.
pub const MARKER_CLASS: &str = "gloss-term";

/// One produced marker, in document order. `index` is the marker's
/// position within the pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub index: usize,
    pub key: String,
    pub text: String,
}

/// Annotation pass over a document subtree: finds term occurrences in
/// text nodes and replaces them, in place, with marker elements.
pub struct Annotator {
    matchers: Vec<TermMatcher>,
}

impl Annotator {
    pub fn new(matchers: Vec<TermMatcher>) -> Self {
        Self { matchers }
    }

    /// Runs the pass under `root`. Text nodes are skipped when their
    /// trimmed content is empty or any ancestor is an existing marker,
    /// a hyperlink, or a `script`/`style` element, so re-running the
    /// pass never nests markers.
    pub fn annotate(&self, root: &mut Element) -> Vec<Marker> {
        let mut markers = Vec::new();
        if self.matchers.is_empty() {
            return markers;
        }
        rewrite_text_nodes(root, &skip_element, &mut |text| {
            if text.trim().is_empty() {
                return None;
            }
            let frags = splice(text, &self.matchers);
            if !frags.iter().any(Fragment::is_marked) {
                return None;
            }
            let nodes = frags
                .into_iter()
                .map(|frag| match frag {
                    Fragment::Plain(plain) => DomNode::Text(plain),
                    Fragment::Marked { key, text } => {
                        markers.push(Marker {
                            index: markers.len(),
                            key: key.clone(),
                            text: text.clone(),
                        });
                        DomNode::Element(marker_element(&key, &text))
                    }
                })
                .collect();
            Some(nodes)
        });
        markers
    }
}

fn skip_element(el: &Element) -> bool {
    el.has_class(MARKER_CLASS) || el.tag == "a" || el.tag == "script" || el.tag == "style"
}

fn marker_element(key: &str, text: &str) -> Element {
    let mut span = Element::new("span");
    span.set_attr("class", MARKER_CLASS);
    span.set_attr("data-key", key);
    span.children.push(DomNode::text(text));
    span
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse;
    use crate::glossary::Glossary;
    use crate::matcher::build_matchers;

    fn annotator_for(json: &str) -> Annotator {
        Annotator::new(build_matchers(&Glossary::from_json_str(json).unwrap()))
    }

    fn body_of(html: &str) -> Element {
        parse(html)
            .find(&|el| el.tag == "body")
            .expect("body")
            .clone()
    }

    #[test]
    fn marks_terms_in_text_nodes() {
        let annotator = annotator_for(r#"{ "物価": { "pattern": "物価|インフレ" } }"#);
        let mut body = body_of("<html><body><p>物価の上昇、つまりインフレ。</p></body></html>");
        let markers = annotator.annotate(&mut body);
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].text, "物価");
        assert_eq!(markers[1].text, "インフレ");
        assert_eq!(markers[1].index, 1);
        assert_eq!(
            body.to_html(),
            "<body><p><span class=\"gloss-term\" data-key=\"物価\">物価</span>の上昇、つまり\
             <span class=\"gloss-term\" data-key=\"物価\">インフレ</span>。</p></body>"
        );
    }

    #[test]
    fn skips_links_scripts_and_styles() {
        let annotator = annotator_for(r#"{ "物価": {} }"#);
        let mut body = body_of(
            "<html><body><a href=\"/x\">物価</a><script>let a = \"物価\";</script>\
             <p>物価</p></body></html>",
        );
        let markers = annotator.annotate(&mut body);
        assert_eq!(markers.len(), 1);
        let html = body.to_html();
        assert!(html.contains("<a href=\"/x\">物価</a>"));
        assert!(html.contains("<script>let a = \"物価\";</script>"));
    }

    #[test]
    fn rerunning_never_nests_markers() {
        let annotator = annotator_for(r#"{ "物価": {} }"#);
        let mut body = body_of("<html><body><p>物価と物価</p></body></html>");
        let first = annotator.annotate(&mut body);
        assert_eq!(first.len(), 2);
        let once = body.to_html();
        let second = annotator.annotate(&mut body);
        assert!(second.is_empty());
        assert_eq!(body.to_html(), once);
    }

    #[test]
    fn empty_matcher_list_is_a_no_op() {
        let annotator = Annotator::new(Vec::new());
        let mut body = body_of("<html><body><p>物価</p></body></html>");
        let markers = annotator.annotate(&mut body);
        assert!(markers.is_empty());
        assert_eq!(body.to_html(), "<body><p>物価</p></body>");
    }

    #[test]
    fn document_order_across_elements() {
        let annotator = annotator_for(r#"{ "金利": {}, "物価": {} }"#);
        let mut body = body_of(
            "<html><body><h2>金利の話</h2><p>まず<em>物価</em>を見る。金利はその後。</p></body></html>",
        );
        let markers = annotator.annotate(&mut body);
        let texts: Vec<&str> = markers.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["金利", "物価", "金利"]);
        assert_eq!(markers[2].index, 2);
    }

    #[test]
    fn longest_term_wins_inside_the_tree() {
        let annotator = annotator_for(r#"{ "金利": {}, "政策金利": {} }"#);
        let mut body = body_of("<html><body><p>政策金利</p></body></html>");
        let markers = annotator.annotate(&mut body);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].key, "政策金利");
    }
}
