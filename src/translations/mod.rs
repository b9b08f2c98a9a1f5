use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tera::{Context as TeraContext, Tera};

use crate::error::TranslateError;

const SYSTEM_PROMPT: &str = include_str!("prompts/system_prompt.tera");

/// Key to translated text. May cover only part of a request.
pub type TranslationMap = HashMap<String, String>;

#[derive(Debug, Clone)]
pub struct TranslateOptions {
    pub source_locale: String,
    pub target_locale: String,
}

/// Ordered `(key, source text)` pairs for one namespace.
#[derive(Debug, Clone, Default)]
pub struct TranslationRequest {
    namespace: String,
    entries: Vec<(String, String)>,
    keys: HashSet<String>,
}

impl TranslationRequest {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    pub fn from_entries(
        namespace: impl Into<String>,
        entries: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        let mut request = Self::new(namespace);
        for (key, source) in entries {
            request.push(key, source);
        }
        request
    }

    /// Adds a pair unless the key is already present or the source text is
    /// blank. Returns whether it was added.
    pub fn push(&mut self, key: impl Into<String>, source: impl Into<String>) -> bool {
        let key = key.into();
        let source = source.into();
        if source.trim().is_empty() || self.keys.contains(&key) {
            return false;
        }
        self.keys.insert(key.clone());
        self.entries.push((key, source));
        true
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Splits into consecutive batches of at most `size` pairs.
    pub fn batches(&self, size: usize) -> Vec<TranslationBatch> {
        let size = size.max(1);
        self.entries
            .chunks(size)
            .map(|chunk| TranslationBatch {
                namespace: self.namespace.clone(),
                entries: chunk.to_vec(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationBatch {
    pub namespace: String,
    pub entries: Vec<(String, String)>,
}

impl TranslationBatch {
    pub fn payload(&self) -> Value {
        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|(key, source)| (key.clone(), Value::String(source.clone())))
            .collect();
        Value::Object(map)
    }
}

pub fn render_system_prompt(options: &TranslateOptions, namespace: &str) -> Result<String> {
    let mut context = TeraContext::new();
    context.insert("source_locale", options.source_locale.as_str());
    context.insert("target_locale", options.target_locale.as_str());
    context.insert("namespace", namespace);
    Tera::one_off(SYSTEM_PROMPT, &context, false).with_context(|| "failed to render system prompt")
}

/// Reads the model's JSON answer for `batch`.
///
/// Keys that were not asked for are dropped and missing keys are allowed.
/// Anything that is not a JSON object of strings is an
/// [`TranslateError::InvalidResponse`].
pub fn parse_response(
    content: &str,
    batch: &TranslationBatch,
) -> std::result::Result<TranslationMap, TranslateError> {
    let body = strip_code_fence(content);
    let value: Value = serde_json::from_str(body)
        .map_err(|err| TranslateError::InvalidResponse(format!("response is not JSON: {err}")))?;
    let Value::Object(object) = value else {
        return Err(TranslateError::InvalidResponse(
            "response is not a JSON object".to_string(),
        ));
    };

    let mut out = TranslationMap::new();
    for (key, _) in &batch.entries {
        match object.get(key) {
            Some(Value::String(text)) => {
                out.insert(key.clone(), text.clone());
            }
            Some(other) => {
                return Err(TranslateError::InvalidResponse(format!(
                    "value for '{}' is not a string: {}",
                    key, other
                )));
            }
            None => {}
        }
    }
    if out.is_empty() && !batch.entries.is_empty() {
        return Err(TranslateError::InvalidResponse(
            "response contains none of the requested keys".to_string(),
        ));
    }
    Ok(out)
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
