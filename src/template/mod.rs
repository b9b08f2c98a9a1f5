//! Value substitution that keeps every other byte of a language file.
//!
//! Nothing here parses the file as a whole. Each dialect scans for
//! key/value spans with a pattern and splices translated values into
//! them, so comments, ordering, line endings and even broken syntax come
//! out exactly as they went in.

use std::path::Path;

use crate::translations::TranslationMap;

mod json;
mod lang;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Json,
    Lang,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Json => "json",
            Dialect::Lang => "lang",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(Dialect::Json),
            "lang" => Some(Dialect::Lang),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

/// Original, untranslated file text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFileTemplate {
    text: String,
    dialect: Dialect,
}

impl RawFileTemplate {
    pub fn new(text: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            text: text.into(),
            dialect,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Translatable `(key, source text)` pairs in file order.
    pub fn entries(&self) -> Vec<(String, String)> {
        match self.dialect {
            Dialect::Json => json::entries(&self.text),
            Dialect::Lang => lang::entries(&self.text),
        }
    }

    pub fn rewrite(&self, translations: &TranslationMap) -> RenderedFileText {
        rewrite(self, translations)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFileText {
    text: String,
    dialect: Dialect,
}

impl RenderedFileText {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Substitutes translated values into `template`. Keys missing from
/// `translations` keep their source text. Never fails.
pub fn rewrite(template: &RawFileTemplate, translations: &TranslationMap) -> RenderedFileText {
    let text = match template.dialect {
        Dialect::Json => json::rewrite(&template.text, translations),
        Dialect::Lang => lang::rewrite(&template.text, translations),
    };
    RenderedFileText {
        text,
        dialect: template.dialect,
    }
}
