use crate::matcher::TermMatcher;

/// A piece of a spliced text run. `Plain` text may still be split by
/// later matchers; `Marked` pieces are final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Plain(String),
    Marked { key: String, text: String },
}

impl Fragment {
    pub fn text(&self) -> &str {
        match self {
            Fragment::Plain(text) => text,
            Fragment::Marked { text, .. } => text,
        }
    }

    pub fn is_marked(&self) -> bool {
        matches!(self, Fragment::Marked { .. })
    }
}

/// Splits `text` into plain and marked fragments by applying each
/// matcher in priority order. Matchers only ever split fragments that
/// are still plain, so a span claimed by an earlier (longer) term is
/// never revisited. Zero-length matches contribute nothing.
pub fn splice(text: &str, matchers: &[TermMatcher]) -> Vec<Fragment> {
    let mut frags = vec![Fragment::Plain(text.to_string())];
    for matcher in matchers {
        let mut i = 0;
        while i < frags.len() {
            let Fragment::Plain(chunk) = &frags[i] else {
                i += 1;
                continue;
            };
            let sites: Vec<(usize, usize)> = matcher
                .regex()
                .find_iter(chunk)
                .filter(|m| !m.is_empty())
                .map(|m| (m.start(), m.end()))
                .collect();
            if sites.is_empty() {
                i += 1;
                continue;
            }
            let chunk = chunk.clone();
            let mut parts = Vec::with_capacity(sites.len() * 2 + 1);
            let mut last = 0;
            for (start, end) in sites {
                if start > last {
                    parts.push(Fragment::Plain(chunk[last..start].to_string()));
                }
                parts.push(Fragment::Marked {
                    key: matcher.key().to_string(),
                    text: chunk[start..end].to_string(),
                });
                last = end;
            }
            if last < chunk.len() {
                parts.push(Fragment::Plain(chunk[last..].to_string()));
            }
            let added = parts.len();
            frags.splice(i..=i, parts);
            i += added;
        }
    }
    frags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glossary::Glossary;
    use crate::matcher::build_matchers;

    fn matchers_for(json: &str) -> Vec<TermMatcher> {
        build_matchers(&Glossary::from_json_str(json).unwrap())
    }

    #[test]
    fn untouched_text_stays_one_plain_fragment() {
        let matchers = matchers_for(r#"{ "物価": {} }"#);
        let frags = splice("天気の話題です。", &matchers);
        assert_eq!(frags, vec![Fragment::Plain("天気の話題です。".into())]);
    }

    #[test]
    fn single_hit_splits_around_the_mark() {
        let matchers = matchers_for(r#"{ "物価": {} }"#);
        let frags = splice("最近の物価の動き", &matchers);
        assert_eq!(
            frags,
            vec![
                Fragment::Plain("最近の".into()),
                Fragment::Marked {
                    key: "物価".into(),
                    text: "物価".into()
                },
                Fragment::Plain("の動き".into()),
            ]
        );
    }

    #[test]
    fn pattern_alternation_marks_every_variant() {
        let matchers = matchers_for(r#"{ "物価": { "pattern": "物価|インフレ" } }"#);
        let frags = splice("物価、つまりインフレ", &matchers);
        let marks: Vec<&Fragment> = frags.iter().filter(|f| f.is_marked()).collect();
        assert_eq!(marks.len(), 2);
        assert_eq!(marks[0].text(), "物価");
        assert_eq!(marks[1].text(), "インフレ");
        for m in marks {
            let Fragment::Marked { key, .. } = m else {
                unreachable!()
            };
            assert_eq!(key, "物価");
        }
    }

    #[test]
    fn longer_term_claims_the_contested_span() {
        let matchers = matchers_for(r#"{ "金利": {}, "政策金利": {} }"#);
        let frags = splice("政策金利を据え置き、金利は横ばい", &matchers);
        let marks: Vec<(&str, &str)> = frags
            .iter()
            .filter_map(|f| match f {
                Fragment::Marked { key, text } => Some((key.as_str(), text.as_str())),
                _ => None,
            })
            .collect();
        // 政策金利 wins its span outright; the bare 金利 later in the
        // sentence still gets its own mark.
        assert_eq!(marks, vec![("政策金利", "政策金利"), ("金利", "金利")]);
    }

    #[test]
    fn marked_fragments_are_never_re_entered() {
        let matchers = matchers_for(r#"{ "経済": {}, "経済対策": {} }"#);
        let frags = splice("経済対策", &matchers);
        assert_eq!(
            frags,
            vec![Fragment::Marked {
                key: "経済対策".into(),
                text: "経済対策".into()
            }]
        );
    }

    #[test]
    fn zero_length_matches_contribute_nothing() {
        let matchers = matchers_for(r#"{ "x": { "pattern": "x*" } }"#);
        let frags = splice("a xx b", &matchers);
        assert_eq!(
            frags,
            vec![
                Fragment::Plain("a ".into()),
                Fragment::Marked {
                    key: "x".into(),
                    text: "xx".into()
                },
                Fragment::Plain(" b".into()),
            ]
        );
    }

    #[test]
    fn empty_matcher_list_is_identity() {
        let frags = splice("そのまま", &[]);
        assert_eq!(frags, vec![Fragment::Plain("そのまま".into())]);
    }
}
