use std::collections::HashMap;

use crate::translations::TranslationMap;

const DEFAULT_RULES: [(char, &str); 8] = [
    (',', "，"),
    ('.', "。"),
    ('!', "！"),
    ('?', "？"),
    (':', "："),
    (';', "；"),
    ('(', "（"),
    (')', "）"),
];

/// ASCII to full-width punctuation for CJK translations.
///
/// A rule only fires when the character before the punctuation is CJK, so
/// numbers, placeholders and embedded English keep their ASCII marks.
#[derive(Debug, Clone)]
pub struct PunctuationCorrector {
    rules: HashMap<char, String>,
}

impl Default for PunctuationCorrector {
    fn default() -> Self {
        Self {
            rules: DEFAULT_RULES
                .iter()
                .map(|(from, to)| (*from, to.to_string()))
                .collect(),
        }
    }
}

impl PunctuationCorrector {
    /// Applies `[punctuation.rules]` from settings. Keys must be a single
    /// character; an empty replacement removes the rule.
    pub fn with_overrides(mut self, overrides: &HashMap<String, String>) -> Self {
        for (from, to) in overrides {
            let mut chars = from.chars();
            let (Some(from), None) = (chars.next(), chars.next()) else {
                continue;
            };
            if to.is_empty() {
                self.rules.remove(&from);
            } else {
                self.rules.insert(from, to.clone());
            }
        }
        self
    }

    pub fn applies_to(locale: &str) -> bool {
        let lower = locale.trim().to_ascii_lowercase();
        lower.starts_with("zh") || lower.starts_with("ja")
    }

    pub fn correct(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for ch in text.chars() {
            let after_cjk = out.chars().next_back().is_some_and(is_cjk);
            match self.rules.get(&ch) {
                Some(replacement) if after_cjk => out.push_str(replacement),
                _ => out.push(ch),
            }
        }
        out
    }

    pub fn correct_all(&self, translations: &mut TranslationMap) {
        for value in translations.values_mut() {
            *value = self.correct(value);
        }
    }
}

fn is_cjk(ch: char) -> bool {
    matches!(ch,
        '\u{3000}'..='\u{303f}'
        | '\u{3040}'..='\u{30ff}'
        | '\u{3400}'..='\u{4dbf}'
        | '\u{4e00}'..='\u{9fff}'
        | '\u{f900}'..='\u{faff}'
        | '\u{ff00}'..='\u{ffef}'
    )
}
