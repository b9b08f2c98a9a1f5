use anyhow::{Result, anyhow};
use futures_util::stream::{self, StreamExt};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub mod correction;
pub mod error;
pub mod logging;
pub mod pack;
pub mod providers;
pub mod retry;
pub mod settings;
pub mod sources;
pub mod template;
mod test_util;
pub mod translations;
mod translator;

pub use correction::PunctuationCorrector;
pub use error::TranslateError;
pub use pack::ResourcePack;
pub use providers::{KeyRing, OpenAI, Provider, ProviderFuture};
pub use retry::{ErrorClass, RateLimitTracker, RetryController, RetryPolicy, classify};
pub use sources::LanguageSource;
pub use template::{Dialect, RawFileTemplate, RenderedFileText};
pub use translations::{TranslateOptions, TranslationBatch, TranslationMap, TranslationRequest};
pub use translator::Translator;

#[derive(Debug, Clone)]
pub struct Config {
    pub input: PathBuf,
    pub output: PathBuf,
    pub lang: Option<String>,
    pub model: Option<String>,
    pub keys: Vec<String>,
    pub settings_path: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LocalizeSummary {
    pub namespaces: usize,
    pub requested: usize,
    pub translated: usize,
    pub failed: Vec<(String, String)>,
}

impl fmt::Display for LocalizeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "namespaces: {}, entries: {}/{} translated",
            self.namespaces, self.translated, self.requested
        )?;
        for (namespace, error) in &self.failed {
            write!(f, "\nfailed: {} ({})", namespace, error)?;
        }
        Ok(())
    }
}

pub async fn run(config: Config) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    if let Some(lang) = config.lang.filter(|lang| !lang.trim().is_empty()) {
        settings.target_locale = lang.trim().to_string();
    }

    let sources = sources::discover(&config.input, &settings.source_locale)?;
    if sources.is_empty() {
        return Err(anyhow!(
            "no {} language files found in {}",
            settings.source_locale,
            config.input.display()
        ));
    }

    let keys = Arc::new(KeyRing::new(providers::resolve_keys(&config.keys)?));
    let options = TranslateOptions {
        source_locale: settings.source_locale.clone(),
        target_locale: settings.target_locale.clone(),
    };
    let mut provider = OpenAI::new(keys.clone(), options);
    if let Some(model) = config.model.or_else(|| settings.model.clone()) {
        provider = provider.with_model(model);
    }
    if let Some(base_url) = settings.base_url.clone() {
        provider = provider.with_base_url(base_url);
    }
    let translator = Translator::new(provider, settings.retry.clone())
        .with_batch_size(settings.batch_size)
        .with_key_rotation(keys)
        .with_deadline(settings.deadline);

    let (pack, summary) = localize(&sources, &translator, &settings).await?;
    pack.write(&config.output)?;
    Ok(summary.to_string())
}

/// Translates every source and renders it into a resource pack.
///
/// A namespace whose translation fails is left out of the pack and listed
/// in the summary. Fails only when every namespace failed.
pub async fn localize<P: Provider>(
    sources: &[LanguageSource],
    translator: &Translator<P>,
    settings: &settings::Settings,
) -> Result<(ResourcePack, LocalizeSummary)> {
    let corrector = (settings.punctuation_enabled
        && PunctuationCorrector::applies_to(&settings.target_locale))
    .then(|| PunctuationCorrector::default().with_overrides(&settings.punctuation_rules));

    let mut results: Vec<(usize, usize, Result<TranslationMap, TranslateError>)> =
        stream::iter(sources.iter().enumerate())
            .map(|(index, source)| async move {
                let request =
                    TranslationRequest::from_entries(&source.namespace, source.template.entries());
                let requested = request.len();
                if request.is_empty() {
                    return (index, requested, Ok(TranslationMap::new()));
                }
                (index, requested, translator.translate(&request).await)
            })
            .buffer_unordered(settings.concurrency.max(1))
            .collect()
            .await;
    results.sort_by_key(|(index, _, _)| *index);

    let mut pack = ResourcePack::new(&settings.target_locale)
        .with_pack_format(settings.pack_format)
        .with_description(&settings.pack_description);
    let mut summary = LocalizeSummary::default();
    for (index, requested, result) in results {
        let source = &sources[index];
        summary.requested += requested;
        match result {
            Ok(mut translations) => {
                if let Some(corrector) = &corrector {
                    corrector.correct_all(&mut translations);
                }
                summary.translated += translations.len();
                summary.namespaces += 1;
                pack.add(&source.namespace, source.template.rewrite(&translations));
            }
            Err(err) => {
                warn!(namespace = %source.namespace, error = %err, "namespace left untranslated");
                summary.failed.push((source.namespace.clone(), err.to_string()));
            }
        }
    }

    if pack.is_empty() && !summary.failed.is_empty() {
        return Err(anyhow!("translation failed for every namespace\n{}", summary));
    }
    info!(
        namespaces = summary.namespaces,
        translated = summary.translated,
        requested = summary.requested,
        "localization finished"
    );
    Ok((pack, summary))
}
