use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, warn};

use crate::template::{Dialect, RawFileTemplate};

/// One namespace's source-locale language file.
#[derive(Debug, Clone)]
pub struct LanguageSource {
    pub namespace: String,
    /// Where the file was found, for log messages.
    pub origin: String,
    pub template: RawFileTemplate,
}

/// Finds `assets/<namespace>/lang/<source_locale>.{json,lang}` files in a
/// mod jar, a directory of jars, or an unpacked directory tree.
///
/// Paths are visited in sorted order and the first file per namespace
/// wins. Unreadable archives and files are logged and skipped.
pub fn discover(input: &Path, source_locale: &str) -> Result<Vec<LanguageSource>> {
    if !input.exists() {
        return Err(anyhow!("input not found: {}", input.display()));
    }
    let mut files = Vec::new();
    if input.is_dir() {
        walk(input, &mut files)?;
    } else {
        files.push(input.to_path_buf());
    }

    let mut found: BTreeMap<String, LanguageSource> = BTreeMap::new();
    for path in files {
        let sources = if is_archive(&path) {
            match read_archive(&path, source_locale) {
                Ok(sources) => sources,
                Err(err) => {
                    warn!(path = %path.display(), error = ?err, "skipping unreadable archive");
                    continue;
                }
            }
        } else {
            match read_loose_file(&path, source_locale) {
                Ok(source) => source.into_iter().collect(),
                Err(err) => {
                    warn!(path = %path.display(), error = ?err, "skipping unreadable language file");
                    continue;
                }
            }
        };
        for source in sources {
            if let Some(existing) = found.get(&source.namespace) {
                warn!(
                    namespace = %source.namespace,
                    kept = %existing.origin,
                    skipped = %source.origin,
                    "duplicate language file"
                );
                continue;
            }
            debug!(namespace = %source.namespace, origin = %source.origin, "found language file");
            found.insert(source.namespace.clone(), source);
        }
    }
    Ok(found.into_values().collect())
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("failed to list directory: {}", dir.display()))?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("failed to list directory: {}", dir.display()))?;
    entries.sort();
    for path in entries {
        if path.is_dir() {
            walk(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jar") || ext.eq_ignore_ascii_case("zip"))
}

fn read_archive(path: &Path, source_locale: &str) -> Result<Vec<LanguageSource>> {
    let file = fs::File::open(path)
        .with_context(|| format!("failed to open archive: {}", path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("failed to read archive: {}", path.display()))?;
    let mut sources = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read entry {} of {}", index, path.display()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let Some((namespace, dialect)) = match_lang_path(&name, source_locale) else {
            continue;
        };
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .with_context(|| format!("failed to read {} in {}", name, path.display()))?;
        let origin = format!("{}!/{}", path.display(), name);
        sources.push(LanguageSource {
            namespace,
            template: RawFileTemplate::new(decode_text(bytes, &origin), dialect),
            origin,
        });
    }
    Ok(sources)
}

fn read_loose_file(path: &Path, source_locale: &str) -> Result<Option<LanguageSource>> {
    let normalized = path.to_string_lossy().replace('\\', "/");
    let Some((namespace, dialect)) = match_lang_path(&normalized, source_locale) else {
        return Ok(None);
    };
    let bytes =
        fs::read(path).with_context(|| format!("failed to read: {}", path.display()))?;
    let origin = path.display().to_string();
    Ok(Some(LanguageSource {
        namespace,
        template: RawFileTemplate::new(decode_text(bytes, &origin), dialect),
        origin,
    }))
}

/// `.../assets/<namespace>/lang/<locale>.<ext>` with a matching locale.
fn match_lang_path(path: &str, source_locale: &str) -> Option<(String, Dialect)> {
    let mut segments = path.rsplit('/');
    let file = segments.next()?;
    if segments.next()? != "lang" {
        return None;
    }
    let namespace = segments.next()?;
    if segments.next()? != "assets" || namespace.is_empty() {
        return None;
    }
    let (stem, ext) = file.rsplit_once('.')?;
    if !stem.eq_ignore_ascii_case(source_locale) {
        return None;
    }
    Some((namespace.to_string(), Dialect::from_extension(ext)?))
}

fn decode_text(bytes: Vec<u8>, origin: &str) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            warn!(origin, "language file is not valid UTF-8; decoding lossily");
            String::from_utf8_lossy(err.as_bytes()).into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_jar(path: &Path, files: &[(&str, &str)]) {
        let file = fs::File::create(path).expect("create jar");
        let mut zip = zip::ZipWriter::new(file);
        for (name, content) in files {
            zip.start_file(*name, zip::write::FileOptions::default())
                .expect("start file");
            zip.write_all(content.as_bytes()).expect("write entry");
        }
        zip.finish().expect("finish jar");
    }

    #[test]
    fn matches_only_source_locale_lang_files() {
        assert_eq!(
            match_lang_path("assets/examplemod/lang/en_US.json", "en_us"),
            Some(("examplemod".to_string(), Dialect::Json))
        );
        assert_eq!(
            match_lang_path("/mods/x/assets/old/lang/en_us.lang", "en_us"),
            Some(("old".to_string(), Dialect::Lang))
        );
        assert_eq!(match_lang_path("assets/examplemod/lang/zh_cn.json", "en_us"), None);
        assert_eq!(match_lang_path("data/examplemod/lang/en_us.json", "en_us"), None);
        assert_eq!(match_lang_path("assets/examplemod/lang/en_us.txt", "en_us"), None);
        assert_eq!(match_lang_path("en_us.json", "en_us"), None);
    }

    #[test]
    fn discovers_jars_and_loose_files_first_wins() {
        let dir = tempdir().expect("tempdir");
        write_jar(
            &dir.path().join("a-mod.jar"),
            &[
                ("META-INF/MANIFEST.MF", "Manifest-Version: 1.0\n"),
                ("assets/amod/lang/en_us.json", "{\"a\": \"A\"}"),
                ("assets/amod/lang/de_de.json", "{\"a\": \"Ah\"}"),
            ],
        );
        write_jar(
            &dir.path().join("b-mod.jar"),
            &[("assets/amod/lang/en_us.json", "{\"a\": \"other\"}")],
        );
        fs::write(dir.path().join("broken.jar"), b"not a zip").expect("write broken");
        let loose = dir.path().join("resources/assets/legacy/lang");
        fs::create_dir_all(&loose).expect("mkdir");
        fs::write(loose.join("en_us.lang"), "item.x=X\n").expect("write lang");

        let sources = discover(dir.path(), "en_us").expect("discover");
        let found: Vec<(&str, Dialect)> = sources
            .iter()
            .map(|s| (s.namespace.as_str(), s.template.dialect()))
            .collect();
        assert_eq!(found, vec![("amod", Dialect::Json), ("legacy", Dialect::Lang)]);
        assert_eq!(sources[0].template.text(), "{\"a\": \"A\"}");
        assert!(sources[0].origin.ends_with("a-mod.jar!/assets/amod/lang/en_us.json"));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_loose_file_is_skipped() {
        let dir = tempdir().expect("tempdir");
        let lang = dir.path().join("assets/dangling/lang");
        fs::create_dir_all(&lang).expect("mkdir");
        std::os::unix::fs::symlink(dir.path().join("gone.json"), lang.join("en_us.json"))
            .expect("symlink");
        let good = dir.path().join("assets/good/lang");
        fs::create_dir_all(&good).expect("mkdir");
        fs::write(good.join("en_us.json"), "{\"a\": \"A\"}").expect("write json");

        let sources = discover(dir.path(), "en_us").expect("discover");
        let namespaces: Vec<&str> = sources.iter().map(|s| s.namespace.as_str()).collect();
        assert_eq!(namespaces, vec!["good"]);
    }

    #[test]
    fn single_jar_input() {
        let dir = tempdir().expect("tempdir");
        let jar = dir.path().join("mod.jar");
        write_jar(&jar, &[("assets/m/lang/en_us.lang", "k=v\n")]);
        let sources = discover(&jar, "en_us").expect("discover");
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].template.entries(), vec![("k".to_string(), "v".to_string())]);
    }

    #[test]
    fn missing_input_is_an_error() {
        let dir = tempdir().expect("tempdir");
        assert!(discover(&dir.path().join("nope"), "en_us").is_err());
    }
}
