use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::info;
use zip::CompressionMethod;
use zip::write::FileOptions;

use crate::template::{Dialect, RenderedFileText};

pub(crate) const DEFAULT_PACK_FORMAT: u32 = 15;
pub(crate) const DEFAULT_DESCRIPTION: &str = "Modpack translations";

#[derive(Debug, Clone)]
struct PackEntry {
    path: String,
    text: String,
}

/// Rendered language files waiting to be written as a resource pack.
#[derive(Debug, Clone)]
pub struct ResourcePack {
    locale: String,
    pack_format: u32,
    description: String,
    entries: Vec<PackEntry>,
}

impl ResourcePack {
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            pack_format: DEFAULT_PACK_FORMAT,
            description: DEFAULT_DESCRIPTION.to_string(),
            entries: Vec::new(),
        }
    }

    pub fn with_pack_format(mut self, pack_format: u32) -> Self {
        self.pack_format = pack_format;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn add(&mut self, namespace: &str, rendered: RenderedFileText) {
        let path = lang_path(namespace, &self.locale, rendered.dialect());
        self.entries.push(PackEntry {
            path,
            text: rendered.into_text(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.path.as_str())
    }

    /// Writes a zip when `output` ends in `.zip`, a directory otherwise.
    pub fn write(&self, output: &Path) -> Result<()> {
        let is_zip = output
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
        if is_zip {
            self.write_zip(output)
        } else {
            self.write_dir(output)
        }
    }

    pub fn write_dir(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory: {}", dir.display()))?;
        write_file(&dir.join("pack.mcmeta"), &self.mcmeta()?)?;
        for entry in &self.entries {
            write_file(&dir.join(&entry.path), &entry.text)?;
        }
        info!(output = %dir.display(), files = self.entries.len(), "resource pack written");
        Ok(())
    }

    pub fn write_zip(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create output directory: {}", parent.display())
            })?;
        }
        let file = fs::File::create(path)
            .with_context(|| format!("failed to create zip: {}", path.display()))?;
        let mut zip = zip::ZipWriter::new(file);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        zip.start_file("pack.mcmeta", options)?;
        zip.write_all(self.mcmeta()?.as_bytes())?;
        for entry in &self.entries {
            zip.start_file(entry.path.as_str(), options)
                .with_context(|| format!("failed to add {} to zip", entry.path))?;
            zip.write_all(entry.text.as_bytes())?;
        }
        zip.finish()
            .with_context(|| format!("failed to finish zip: {}", path.display()))?;
        info!(output = %path.display(), files = self.entries.len(), "resource pack written");
        Ok(())
    }

    fn mcmeta(&self) -> Result<String> {
        let meta = json!({
            "pack": {
                "pack_format": self.pack_format,
                "description": self.description,
            }
        });
        Ok(serde_json::to_string_pretty(&meta)?)
    }
}

/// JSON files use `zh_cn`; legacy `.lang` files are looked up as `zh_CN`.
pub fn lang_path(namespace: &str, locale: &str, dialect: Dialect) -> String {
    let locale = match dialect {
        Dialect::Json => locale.to_ascii_lowercase(),
        Dialect::Lang => legacy_locale(locale),
    };
    format!("assets/{}/lang/{}.{}", namespace, locale, dialect.as_str())
}

fn legacy_locale(locale: &str) -> String {
    match locale.split_once('_') {
        Some((language, region)) => format!(
            "{}_{}",
            language.to_ascii_lowercase(),
            region.to_ascii_uppercase()
        ),
        None => locale.to_ascii_lowercase(),
    }
}

fn write_file(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    fs::write(path, text).with_context(|| format!("failed to write: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::RawFileTemplate;
    use crate::translations::TranslationMap;
    use std::io::Read;
    use tempfile::tempdir;

    fn pack() -> ResourcePack {
        let mut pack = ResourcePack::new("zh_CN").with_description("Test pack");
        let json = RawFileTemplate::new("{\"a\": \"A\"}", Dialect::Json);
        let lang = RawFileTemplate::new("b=B\n", Dialect::Lang);
        let translations = TranslationMap::from([
            ("a".to_string(), "甲".to_string()),
            ("b".to_string(), "乙".to_string()),
        ]);
        pack.add("newmod", json.rewrite(&translations));
        pack.add("oldmod", lang.rewrite(&translations));
        pack
    }

    #[test]
    fn lang_paths_follow_dialect() {
        assert_eq!(
            lang_path("examplemod", "zh_CN", Dialect::Json),
            "assets/examplemod/lang/zh_cn.json"
        );
        assert_eq!(
            lang_path("examplemod", "zh_cn", Dialect::Lang),
            "assets/examplemod/lang/zh_CN.lang"
        );
        assert_eq!(
            lang_path("examplemod", "ZH_tw", Dialect::Lang),
            "assets/examplemod/lang/zh_TW.lang"
        );
        assert_eq!(
            lang_path("examplemod", "lolcat", Dialect::Lang),
            "assets/examplemod/lang/lolcat.lang"
        );
    }

    #[test]
    fn writes_directory_pack() {
        let dir = tempdir().expect("tempdir");
        let out = dir.path().join("pack");
        pack().write(&out).expect("write pack");

        let meta = fs::read_to_string(out.join("pack.mcmeta")).expect("read mcmeta");
        let meta: serde_json::Value = serde_json::from_str(&meta).expect("parse mcmeta");
        assert_eq!(meta["pack"]["pack_format"], DEFAULT_PACK_FORMAT);
        assert_eq!(meta["pack"]["description"], "Test pack");
        assert_eq!(
            fs::read_to_string(out.join("assets/newmod/lang/zh_cn.json")).expect("read json"),
            "{\"a\": \"甲\"}"
        );
        assert_eq!(
            fs::read_to_string(out.join("assets/oldmod/lang/zh_CN.lang")).expect("read lang"),
            "b=乙\n"
        );
    }

    #[test]
    fn writes_zip_pack() {
        let dir = tempdir().expect("tempdir");
        let out = dir.path().join("out/pack.zip");
        pack().write(&out).expect("write pack");

        let mut archive =
            zip::ZipArchive::new(fs::File::open(&out).expect("open zip")).expect("read zip");
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "assets/newmod/lang/zh_cn.json",
                "assets/oldmod/lang/zh_CN.lang",
                "pack.mcmeta"
            ]
        );
        let mut text = String::new();
        archive
            .by_name("assets/oldmod/lang/zh_CN.lang")
            .expect("entry")
            .read_to_string(&mut text)
            .expect("read entry");
        assert_eq!(text, "b=乙\n");
    }
}
