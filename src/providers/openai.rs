use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{KeyRing, Provider, ProviderFuture};
use crate::error::TranslateError;
use crate::translations::{self, TranslateOptions, TranslationBatch, TranslationMap};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub(crate) const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct OpenAI {
    client: reqwest::Client,
    keys: Arc<KeyRing>,
    model: String,
    base_url: String,
    options: TranslateOptions,
}

impl OpenAI {
    pub fn new(keys: Arc<KeyRing>, options: TranslateOptions) -> Self {
        Self {
            client: reqwest::Client::new(),
            keys,
            model: DEFAULT_MODEL.to_string(),
            base_url: base_url(),
            options,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        if !base_url.trim().is_empty() {
            self.base_url = base_url.trim_end_matches('/').to_string();
        }
        self
    }
}

impl Provider for OpenAI {
    fn name(&self) -> &str {
        "OpenAI"
    }

    fn translate(&self, batch: TranslationBatch) -> ProviderFuture {
        let provider = self.clone();
        Box::pin(async move { call_chat_completions(provider, batch).await })
    }
}

fn base_url() -> String {
    std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

async fn call_chat_completions(
    provider: OpenAI,
    batch: TranslationBatch,
) -> Result<TranslationMap, TranslateError> {
    let key = provider
        .keys
        .current()
        .ok_or_else(|| TranslateError::Fatal("no API key configured".to_string()))?
        .to_string();
    let system_prompt = translations::render_system_prompt(&provider.options, &batch.namespace)
        .map_err(|err| TranslateError::Fatal(format!("{err:#}")))?;
    let url = format!("{}/chat/completions", provider.base_url);
    let body = json!({
        "model": provider.model,
        "messages": [
            {"role": "system", "content": system_prompt},
            {"role": "user", "content": batch.payload().to_string()}
        ],
        "response_format": {"type": "json_object"}
    });

    debug!(
        namespace = %batch.namespace,
        entries = batch.entries.len(),
        model = %provider.model,
        "sending translation batch"
    );
    let response = provider
        .client
        .post(&url)
        .bearer_auth(key)
        .json(&body)
        .send()
        .await?;

    let status = response.status();
    let retry_after = retry_after(response.headers());
    let text = response.text().await.unwrap_or_default();
    if status.is_success() {
        let content = extract_content(&text)?;
        return translations::parse_response(&content, &batch);
    }
    let message = extract_openai_error(&text).unwrap_or(text);
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(TranslateError::RateLimited {
            message,
            retry_after,
        });
    }
    Err(TranslateError::Service {
        status: status.as_u16(),
        message,
    })
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?.trim();
    value.parse::<u64>().ok().map(Duration::from_secs)
}

fn extract_content(text: &str) -> Result<String, TranslateError> {
    let payload: ChatResponse = serde_json::from_str(text).map_err(|err| {
        TranslateError::InvalidResponse(format!("failed to parse OpenAI response JSON: {err}"))
    })?;
    payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| TranslateError::InvalidResponse("no content returned from OpenAI".into()))
}

fn extract_openai_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<OpenAIError>,
    }

    #[derive(Deserialize)]
    struct OpenAIError {
        message: Option<String>,
        code: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    let message = error.message.filter(|value| !value.trim().is_empty());
    match (message, error.code) {
        (Some(message), Some(code)) => Some(format!("{} (code: {})", message, code)),
        (Some(message), None) => Some(message),
        (None, Some(code)) => Some(code),
        (None, None) => None,
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}
