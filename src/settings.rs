use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pack::{DEFAULT_DESCRIPTION, DEFAULT_PACK_FORMAT};
use crate::retry::RetryPolicy;
use crate::translator::DEFAULT_BATCH_SIZE;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");
const HOME_DIR_NAME: &str = ".modpack-localizer";

#[derive(Debug, Clone)]
pub struct Settings {
    pub source_locale: String,
    pub target_locale: String,
    pub batch_size: usize,
    pub concurrency: usize,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub deadline: Option<Duration>,
    pub retry: RetryPolicy,
    pub punctuation_enabled: bool,
    pub punctuation_rules: HashMap<String, String>,
    pub pack_description: String,
    pub pack_format: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_locale: "en_us".to_string(),
            target_locale: "zh_cn".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: 4,
            model: None,
            base_url: None,
            deadline: None,
            retry: RetryPolicy::default(),
            punctuation_enabled: true,
            punctuation_rules: HashMap::new(),
            pack_description: DEFAULT_DESCRIPTION.to_string(),
            pack_format: DEFAULT_PACK_FORMAT,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    translation: Option<TranslationSettings>,
    retry: Option<RetrySettings>,
    punctuation: Option<PunctuationSettings>,
    pack: Option<PackSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslationSettings {
    source_locale: Option<String>,
    target_locale: Option<String>,
    batch_size: Option<usize>,
    concurrency: Option<usize>,
    model: Option<String>,
    base_url: Option<String>,
    deadline_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RetrySettings {
    rate_limit_base_secs: Option<f64>,
    rate_limit_max_secs: Option<f64>,
    initial_delay_secs: Option<f64>,
    format_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PunctuationSettings {
    enabled: Option<bool>,
    rules: Option<HashMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
struct PackSettings {
    description: Option<String>,
    pack_format: Option<u32>,
}

/// Built-in defaults, then `settings.toml` / `settings.local.toml` in the
/// working directory, then the same pair under `~/.modpack-localizer`,
/// then `extra_path`. Later files override single fields.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    settings.merge(parse(DEFAULT_SETTINGS_TOML, Path::new("<built-in settings>"))?);
    ensure_home_settings_file()?;

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings.merge(parse(&content, &path)?);
        }
    }

    Ok(settings)
}

fn parse(content: &str, path: &Path) -> Result<SettingsFile> {
    toml::from_str(content).with_context(|| format!("failed to parse settings: {}", path.display()))
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(translation) = incoming.translation {
            if let Some(locale) = non_empty(translation.source_locale) {
                self.source_locale = locale;
            }
            if let Some(locale) = non_empty(translation.target_locale) {
                self.target_locale = locale;
            }
            if let Some(size) = translation.batch_size.filter(|size| *size > 0) {
                self.batch_size = size;
            }
            if let Some(concurrency) = translation.concurrency.filter(|value| *value > 0) {
                self.concurrency = concurrency;
            }
            if let Some(model) = non_empty(translation.model) {
                self.model = Some(model);
            }
            if let Some(base_url) = non_empty(translation.base_url) {
                self.base_url = Some(base_url);
            }
            if let Some(secs) = translation.deadline_secs {
                self.deadline = (secs > 0).then(|| Duration::from_secs(secs));
            }
        }
        if let Some(retry) = incoming.retry {
            if let Some(delay) = positive_secs(retry.rate_limit_base_secs) {
                self.retry.rate_limit_base = delay;
            }
            if let Some(delay) = positive_secs(retry.rate_limit_max_secs) {
                self.retry.rate_limit_max = delay;
            }
            if let Some(delay) = positive_secs(retry.initial_delay_secs) {
                self.retry.initial_delay = delay;
            }
            if let Some(ms) = retry.format_delay_ms {
                self.retry.format_delay = Duration::from_millis(ms);
            }
        }
        if let Some(punctuation) = incoming.punctuation {
            if let Some(enabled) = punctuation.enabled {
                self.punctuation_enabled = enabled;
            }
            if let Some(rules) = punctuation.rules {
                self.punctuation_rules.extend(rules);
            }
        }
        if let Some(pack) = incoming.pack {
            if let Some(description) = non_empty(pack.description) {
                self.pack_description = description;
            }
            if let Some(format) = pack.pack_format.filter(|value| *value > 0) {
                self.pack_format = format;
            }
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn positive_secs(value: Option<f64>) -> Option<Duration> {
    value
        .filter(|secs| *secs > 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(HOME_DIR_NAME))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::with_temp_home;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_built_in_file() {
        with_temp_home(|home| {
            let settings = load_settings(None).expect("load settings");
            assert_eq!(settings.source_locale, "en_us");
            assert_eq!(settings.target_locale, "zh_cn");
            assert_eq!(settings.batch_size, 50);
            assert_eq!(settings.retry.rate_limit_base, Duration::from_secs(1));
            assert_eq!(settings.retry.rate_limit_max, Duration::from_secs(300));
            assert_eq!(settings.retry.format_delay, Duration::from_millis(100));
            assert_eq!(settings.deadline, None);
            assert!(settings.punctuation_enabled);
            assert!(home.join(HOME_DIR_NAME).join("settings.toml").exists());
        });
    }

    #[test]
    fn extra_file_overrides_single_fields() {
        with_temp_home(|_| {
            let dir = tempdir().expect("tempdir");
            let path = dir.path().join("extra.toml");
            fs::write(
                &path,
                r#"
[translation]
target_locale = "ja_jp"
batch_size = 0
deadline_secs = 600

[retry]
rate_limit_max_secs = 60.0
initial_delay_secs = -1.0

[punctuation.rules]
"~" = "～"
"#,
            )
            .expect("write extra");
            let settings = load_settings(Some(&path)).expect("load settings");
            assert_eq!(settings.target_locale, "ja_jp");
            assert_eq!(settings.source_locale, "en_us");
            assert_eq!(settings.batch_size, 50);
            assert_eq!(settings.deadline, Some(Duration::from_secs(600)));
            assert_eq!(settings.retry.rate_limit_max, Duration::from_secs(60));
            assert_eq!(settings.retry.initial_delay, Duration::from_secs(1));
            assert_eq!(settings.punctuation_rules["~"], "～");
        });
    }

    #[test]
    fn missing_extra_file_is_an_error() {
        with_temp_home(|home| {
            let err = load_settings(Some(&home.join("missing.toml"))).unwrap_err();
            assert!(err.to_string().contains("settings file not found"));
        });
    }

    #[test]
    fn malformed_settings_report_the_path() {
        with_temp_home(|home| {
            let path = home.join("bad.toml");
            fs::write(&path, "[translation\n").expect("write bad");
            let err = load_settings(Some(&path)).unwrap_err();
            assert!(format!("{err:#}").contains("bad.toml"));
        });
    }
}
