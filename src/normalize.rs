use unicode_normalization::UnicodeNormalization;

/// Canonical form used for loose term comparison: NFKC fold, then drop
/// every whitespace character and both full-width and ASCII parens.
///
/// `normalize("東京 都") == normalize("東京都") == normalize("東京（都）")`.
pub fn normalize(input: &str) -> String {
    input
        .nfkc()
        .filter(|c| !c.is_whitespace() && !matches!(c, '（' | '）' | '(' | ')'))
        .collect()
}
