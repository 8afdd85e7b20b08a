//! File-backed sanitized rule store.
//!
//! Records live at `<dir>/sanitized_rule_<fqcn>_<language>.json`. A missing or
//! unreadable record is not an error: it is logged and treated as absent.
//! Every lookup is memoised per (class, language), absence included, for as
//! long as the store lives.

use crate::model::SanitizedRule;
use cryslgen_core::error::RuleError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Anything that can hand out sanitized rules by class and language.
pub trait RuleRepository: Send + Sync {
    /// Load the record for one language.
    fn load(&self, class_name: &str, language: &str) -> Option<Arc<SanitizedRule>>;

    /// Try each language in order and return the first record found.
    fn load_preferring(&self, class_name: &str, languages: &[String]) -> Option<Arc<SanitizedRule>> {
        languages.iter().find_map(|lang| self.load(class_name, lang))
    }
}

type CacheKey = (String, String);

/// Sanitized rule records read from a directory of JSON files.
pub struct SanitizedRuleStore {
    dir: PathBuf,
    cache: Mutex<HashMap<CacheKey, Option<Arc<SanitizedRule>>>>,
}

impl SanitizedRuleStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `class_name` in `language`.
    pub fn record_path(&self, class_name: &str, language: &str) -> PathBuf {
        self.dir
            .join(format!("sanitized_rule_{class_name}_{language}.json"))
    }

    /// Number of memoised lookups, hits and confirmed misses alike.
    pub fn cached_lookups(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn read_record(&self, class_name: &str, language: &str) -> Option<Arc<SanitizedRule>> {
        let path = self.record_path(class_name, language);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Missing sanitized rule");
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read sanitized rule");
                return None;
            }
        };

        match SanitizedRule::from_json(&content) {
            Ok(rule) => {
                debug!(class = class_name, language, "Loaded sanitized rule");
                Some(Arc::new(rule))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping corrupt sanitized rule");
                None
            }
        }
    }
}

impl RuleRepository for SanitizedRuleStore {
    fn load(&self, class_name: &str, language: &str) -> Option<Arc<SanitizedRule>> {
        let key = (class_name.to_string(), language.to_string());
        if let Some(hit) = self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(&key) {
            return hit.clone();
        }

        let record = self.read_record(class_name, language);
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, record.clone());
        record
    }
}

/// In-process repository, handy for tests and for callers that already hold
/// their records in memory.
#[derive(Default)]
pub struct InMemoryRules {
    records: HashMap<CacheKey, Arc<SanitizedRule>>,
}

impl InMemoryRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, class_name: &str, language: &str, rule: SanitizedRule) {
        self.records
            .insert((class_name.to_string(), language.to_string()), Arc::new(rule));
    }

    /// Builder-style insert.
    pub fn with(mut self, class_name: &str, language: &str, rule: SanitizedRule) -> Self {
        self.insert(class_name, language, rule);
        self
    }
}

impl RuleRepository for InMemoryRules {
    fn load(&self, class_name: &str, language: &str) -> Option<Arc<SanitizedRule>> {
        self.records
            .get(&(class_name.to_string(), language.to_string()))
            .cloned()
    }
}

/// Languages to try for a request: the requested one, then `fallback` if it
/// differs (case-insensitively).
pub fn preferred_languages(language: &str, fallback: &str) -> Vec<String> {
    let mut langs = vec![language.to_string()];
    if !language.eq_ignore_ascii_case(fallback) {
        langs.push(fallback.to_string());
    }
    langs
}

/// `javax.crypto.Cipher` -> `Cipher`.
pub fn simple_name(fqcn: &str) -> &str {
    fqcn.rsplit('.').next().unwrap_or(fqcn)
}

/// Read `<rules_dir>/<SimpleName>.crysl` for a fully-qualified class.
pub fn load_crysl_source(rules_dir: &Path, fqcn: &str) -> Result<String, RuleError> {
    let path = rules_dir.join(format!("{}.crysl", simple_name(fqcn)));
    if !path.exists() {
        return Err(RuleError::SourceNotFound {
            class_name: fqcn.to_string(),
            path,
        });
    }
    std::fs::read_to_string(&path).map_err(|e| RuleError::Read {
        path,
        reason: e.to_string(),
    })
}
