use std::collections::HashSet;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::translations::TranslationMap;

fn line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\s*)([^#=\s]+)(\s*=\s*)(.*)$").expect("lang line pattern is valid")
    })
}

struct Line<'a> {
    body: &'a str,
    ending: &'a str,
}

fn lines(text: &str) -> impl Iterator<Item = Line<'_>> {
    text.split_inclusive('\n').map(|raw| {
        if let Some(body) = raw.strip_suffix("\r\n") {
            Line {
                body,
                ending: "\r\n",
            }
        } else if let Some(body) = raw.strip_suffix('\n') {
            Line { body, ending: "\n" }
        } else {
            Line {
                body: raw,
                ending: "",
            }
        }
    })
}

fn capture<'t>(caps: &Captures<'t>, index: usize) -> &'t str {
    caps.get(index).map_or("", |m| m.as_str())
}

pub(crate) fn entries(text: &str) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for line in lines(text) {
        let Some(caps) = line_pattern().captures(line.body) else {
            continue;
        };
        let key = capture(&caps, 2);
        if seen.insert(key.to_string()) {
            out.push((key.to_string(), capture(&caps, 4).to_string()));
        }
    }
    out
}

pub(crate) fn rewrite(text: &str, translations: &TranslationMap) -> String {
    let mut out = String::with_capacity(text.len());
    for line in lines(text) {
        let Some(caps) = line_pattern().captures(line.body) else {
            out.push_str(line.body);
            out.push_str(line.ending);
            continue;
        };
        let key = capture(&caps, 2);
        out.push_str(capture(&caps, 1));
        out.push_str(key);
        out.push_str(capture(&caps, 3));
        match translations.get(key) {
            Some(translated) => out.push_str(&escape_newlines(translated)),
            None => out.push_str(capture(&caps, 4)),
        }
        out.push_str(line.ending);
    }
    out
}

/// Line breaks inside a value become a literal `\n`.
fn escape_newlines(value: &str) -> String {
    value
        .replace("\r\n", "\\n")
        .replace(['\n', '\r'], "\\n")
}
