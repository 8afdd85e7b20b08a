//! On-disk cache of generated explanations.
//!
//! One UTF-8 text file per class and language:
//! `<explanation_cache_dir>/<safe_class_name>_<language>.txt`.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Replace every character outside `[A-Za-z0-9.-]` with `_`.
pub fn safe_class_name(fqcn: &str) -> String {
    fqcn.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ExplanationCache {
    dir: PathBuf,
}

impl ExplanationCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, fqcn: &str, language: &str) -> PathBuf {
        self.dir.join(format!("{}_{language}.txt", safe_class_name(fqcn)))
    }

    /// Cached text, trimmed. Missing or unreadable entries read as `""`.
    pub fn read(&self, fqcn: &str, language: &str) -> String {
        let path = self.path_for(fqcn, language);
        if !path.exists() {
            return String::new();
        }
        match std::fs::read_to_string(&path) {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read cached explanation");
                String::new()
            }
        }
    }

    /// Try each language in order; the first non-empty entry wins.
    pub fn read_preferring(&self, fqcn: &str, languages: &[String]) -> String {
        languages
            .iter()
            .map(|lang| self.read(fqcn, lang))
            .find(|text| !text.is_empty())
            .unwrap_or_default()
    }

    pub fn write(&self, fqcn: &str, language: &str, text: &str) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(fqcn, language);
        std::fs::write(&path, text)?;
        debug!(path = %path.display(), "Cached explanation");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_names() {
        assert_eq!(safe_class_name("javax.crypto.Cipher"), "javax.crypto.Cipher");
        assert_eq!(safe_class_name("a.B$Inner<T>"), "a.B_Inner_T_");
        assert_eq!(safe_class_name("x-y z"), "x-y_z");
    }

    #[test]
    fn write_then_read_trims() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ExplanationCache::new(tmp.path().join("llm_cache"));
        let path = cache.write("javax.crypto.Cipher", "English", "\n## Overview\n\n").unwrap();

        assert!(path.ends_with("javax.crypto.Cipher_English.txt"));
        assert_eq!(cache.read("javax.crypto.Cipher", "English"), "## Overview");
    }

    #[test]
    fn missing_entry_reads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ExplanationCache::new(tmp.path());
        assert_eq!(cache.read("javax.crypto.Cipher", "German"), "");
    }

    #[test]
    fn language_preference() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ExplanationCache::new(tmp.path());
        cache.write("java.security.Signature", "English", "english text").unwrap();

        let langs = vec!["German".to_string(), "English".to_string()];
        assert_eq!(cache.read_preferring("java.security.Signature", &langs), "english text");

        cache.write("java.security.Signature", "German", "deutscher Text").unwrap();
        assert_eq!(cache.read_preferring("java.security.Signature", &langs), "deutscher Text");
    }
}
