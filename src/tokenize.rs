use std::sync::OnceLock;

use regex::Regex;

use crate::model::Token;

fn separator() -> &'static Regex {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    SEPARATOR.get_or_init(|| Regex::new(r"\s+|[,.!?]").expect("separator pattern is valid"))
}

/// Naive whitespace/punctuation split standing in for a model tokenizer.
///
/// Punctuation survives as its own token, whitespace runs are dropped, and
/// nothing empty is ever returned.
pub fn tokenize(prompt: &str) -> Vec<Token> {
    let mut fragments = Vec::new();
    let mut last = 0;
    for m in separator().find_iter(prompt) {
        fragments.push(&prompt[last..m.start()]);
        fragments.push(m.as_str());
        last = m.end();
    }
    fragments.push(&prompt[last..]);

    fragments
        .into_iter()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .enumerate()
        .map(|(index, text)| Token {
            text: text.to_string(),
            index,
        })
        .collect()
}

/// `count + index` for negative indices, untouched otherwise. No clamping:
/// the result may still be negative or past the end.
pub fn resolve_index(index: i64, count: usize) -> i64 {
    if index < 0 { count as i64 + index } else { index }
}

/// Bounds-checked lookup of an already resolved index.
pub fn token_at(tokens: &[Token], resolved: i64) -> Option<&Token> {
    usize::try_from(resolved).ok().and_then(|i| tokens.get(i))
}
