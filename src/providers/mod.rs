use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};

use crate::error::TranslateError;
use crate::translations::{TranslationBatch, TranslationMap};

mod openai;

pub use openai::OpenAI;

pub type ProviderFuture =
    Pin<Box<dyn Future<Output = std::result::Result<TranslationMap, TranslateError>> + Send>>;

/// The external translate operation: one batch in, a key to text map out.
pub trait Provider: Clone + Send + Sync {
    fn name(&self) -> &str;
    fn translate(&self, batch: TranslationBatch) -> ProviderFuture;
}

/// API keys shared by every batch. The index cycles, so a key passed over
/// by one call is tried again by the next.
#[derive(Debug)]
pub struct KeyRing {
    keys: Vec<String>,
    current: AtomicUsize,
}

impl KeyRing {
    pub fn new(keys: impl IntoIterator<Item = String>) -> Self {
        let mut unique: Vec<String> = Vec::new();
        for key in keys {
            let key = key.trim().to_string();
            if !key.is_empty() && !unique.contains(&key) {
                unique.push(key);
            }
        }
        Self {
            keys: unique,
            current: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn current(&self) -> Option<&str> {
        self.keys
            .get(self.current.load(Ordering::SeqCst))
            .map(String::as_str)
    }

    /// Moves to the next key, wrapping after the last. Returns `false` when
    /// there is no other key to move to.
    pub fn rotate(&self) -> bool {
        let len = self.keys.len();
        if len < 2 {
            return false;
        }
        self.current
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |index| {
                Some((index + 1) % len)
            })
            .is_ok()
    }
}

/// Keys from `--key` win; otherwise `OPENAI_API_KEY`, which may hold a
/// comma separated list.
pub fn resolve_keys(override_keys: &[String]) -> Result<Vec<String>> {
    let keys: Vec<String> = if override_keys.is_empty() {
        get_env("OPENAI_API_KEY")
            .map(|value| split_keys(&value))
            .unwrap_or_default()
    } else {
        override_keys.iter().flat_map(|key| split_keys(key)).collect()
    };
    if keys.is_empty() {
        return Err(anyhow!(
            "no API keys found (pass --key or set OPENAI_API_KEY)"
        ));
    }
    Ok(keys)
}

fn split_keys(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect()
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ring_rotation_wraps_around() {
        let ring = KeyRing::new(vec![
            "a".to_string(),
            " b ".to_string(),
            "a".to_string(),
            "".to_string(),
        ]);
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.current(), Some("a"));
        assert!(ring.rotate());
        assert_eq!(ring.current(), Some("b"));
        assert!(ring.rotate());
        assert_eq!(ring.current(), Some("a"));
    }

    #[test]
    fn single_key_ring_never_rotates() {
        let ring = KeyRing::new(vec!["only".to_string()]);
        assert!(!ring.rotate());
        assert_eq!(ring.current(), Some("only"));
    }

    #[test]
    fn empty_key_ring_never_rotates() {
        let ring = KeyRing::new(Vec::new());
        assert!(ring.is_empty());
        assert_eq!(ring.current(), None);
        assert!(!ring.rotate());
    }

    #[test]
    fn override_keys_split_on_commas() {
        let keys = resolve_keys(&["k1, k2".to_string(), "k3".to_string()]).unwrap();
        assert_eq!(keys, vec!["k1", "k2", "k3"]);
    }
}
