use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::translations::TranslationMap;

fn pair_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#""((?:[^"\\]|\\.)*)"\s*:\s*"((?:[^"\\]|\\.)*)""#)
            .expect("json pair pattern is valid")
    })
}

/// Every `"key": "value"` pair whose key and value both decode, first
/// occurrence of a key wins.
pub(crate) fn entries(text: &str) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for caps in pair_pattern().captures_iter(text) {
        let (Some(key), Some(value)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let (Some(key), Some(value)) = (decode(key.as_str()), decode(value.as_str())) else {
            continue;
        };
        if seen.insert(key.clone()) {
            out.push((key, value));
        }
    }
    out
}

pub(crate) fn rewrite(text: &str, translations: &TranslationMap) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in pair_pattern().captures_iter(text) {
        let (Some(key), Some(value)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        if decode(value.as_str()).is_none() {
            continue;
        }
        let Some(replacement) = decode(key.as_str())
            .and_then(|key| translations.get(&key))
            .and_then(|translated| encode(translated))
        else {
            continue;
        };
        out.push_str(&text[last..value.start()]);
        out.push_str(&replacement);
        last = value.end();
    }
    out.push_str(&text[last..]);
    out
}

/// Unescapes the body of a quoted string (without the quotes).
fn decode(inner: &str) -> Option<String> {
    serde_json::from_str::<String>(&format!("\"{inner}\"")).ok()
}

/// Escapes a value for use between quotes. Non-ASCII stays literal.
fn encode(value: &str) -> Option<String> {
    let quoted = serde_json::to_string(value).ok()?;
    quoted
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .map(str::to_string)
}
