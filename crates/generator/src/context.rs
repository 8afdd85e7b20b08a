//! Everything a prompt needs to know about one rule.
//!
//! [`RuleContext`] gathers the rendered CrySL sections, the sanitized record
//! summary and the dependency blocks. It can be built straight from a `.crysl`
//! source (explanations) or from a [`RulePayload`] handed over by the upstream
//! documentation pipeline (code examples).

use cryslgen_core::error::RuleError;
use cryslgen_rules::{
    DependencyResolver, ParseMode, RuleField, RuleRepository, RuleSections, SectionHeader,
    format_constraints, format_ensures, parse_sections_with,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Raw source longer than this is cut in prompts.
pub const RAW_EXCERPT_CHARS: usize = 2000;

const NO_SANITIZED_FIELDS: &str = "No sanitized fields supplied.";

/// Rule JSON written by the upstream documentation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulePayload {
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects: Option<RuleField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<RuleField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<RuleField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<RuleField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<RuleField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ensures: Option<RuleField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forbidden: Option<RuleField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency: Option<RuleField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_type: Option<String>,
}

impl RulePayload {
    pub fn from_json(text: &str) -> Result<Self, RuleError> {
        serde_json::from_str(text).map_err(|e| RuleError::InvalidPayload(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, RuleError> {
        let text = std::fs::read_to_string(path).map_err(|e| RuleError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&text)
            .map_err(|e| RuleError::InvalidPayload(format!("{}: {e}", path.display())))
    }

    /// An absent `exampleType` means insecure.
    pub fn wants_insecure(&self) -> bool {
        self.example_type
            .as_deref()
            .is_none_or(|t| t.to_lowercase().contains("insecure"))
    }

    fn field(&self, header: SectionHeader) -> Option<&RuleField> {
        match header {
            SectionHeader::Spec => None,
            SectionHeader::Objects => self.objects.as_ref(),
            SectionHeader::Events => self.events.as_ref(),
            SectionHeader::Order => self.order.as_ref(),
            SectionHeader::Constraints => self.constraints.as_ref(),
            SectionHeader::Requires => self.requires.as_ref(),
            SectionHeader::Ensures => self.ensures.as_ref(),
            SectionHeader::Forbidden => self.forbidden.as_ref(),
        }
    }

    /// The payload's own rendering of a section, if it has one.
    pub fn field_text(&self, header: SectionHeader) -> Option<String> {
        if header == SectionHeader::Spec {
            return Some(self.class_name.clone());
        }
        let text = match self.field(header)? {
            RuleField::Text(s) => s.trim().to_string(),
            other => other.items().join(", "),
        };
        (!text.is_empty()).then_some(text)
    }

    /// Parsed `.crysl` section when present and non-empty, else the payload
    /// field, else `N/A`.
    pub fn prefer(&self, sections: &RuleSections, header: SectionHeader) -> String {
        match sections.get(header) {
            Some(lines) if !lines.is_empty() => sections.section_text(header),
            _ => self.field_text(header).unwrap_or_else(|| "N/A".to_string()),
        }
    }
}

/// Where the sanitized records and dependency settings come from.
pub struct ContextSources<'a> {
    pub repo: &'a Arc<dyn RuleRepository>,
    pub languages: &'a [String],
    pub ensures_depth: usize,
    pub mode: ParseMode,
}

#[derive(Debug, Clone)]
pub struct RuleContext {
    /// Class name used for record lookups.
    pub fqcn: String,
    /// Class name shown in prompts (SPEC, or the fqcn).
    pub class_name: String,
    pub source: String,
    pub texts: BTreeMap<SectionHeader, String>,
    pub sanitized_summary: String,
    pub dependency_constraints: String,
    pub dependency_ensures: String,
}

impl RuleContext {
    /// Build from a `.crysl` source. Absent sections get their defaults.
    pub fn assemble(fqcn: &str, source: String, sources: &ContextSources<'_>) -> Self {
        let sections = parse_sections_with(&source, sources.mode);
        let class_name = sections
            .spec_class()
            .filter(|s| !s.is_empty())
            .unwrap_or(fqcn)
            .to_string();
        let texts = SectionHeader::ALL
            .into_iter()
            .map(|h| {
                let text = match h {
                    SectionHeader::Spec => class_name.clone(),
                    _ => sections.section_text(h),
                };
                (h, text)
            })
            .collect();
        Self::finish(fqcn, class_name, source, texts, sources)
    }

    /// Build from an upstream payload. `source` may be empty when no `.crysl`
    /// file exists; the payload fields are used then.
    pub fn from_payload(payload: &RulePayload, source: String, sources: &ContextSources<'_>) -> Self {
        let sections = if source.trim().is_empty() {
            RuleSections::default()
        } else {
            parse_sections_with(&source, sources.mode)
        };
        let texts = SectionHeader::ALL
            .into_iter()
            .map(|h| {
                let text = match h {
                    SectionHeader::Spec => payload.class_name.clone(),
                    _ => payload.prefer(&sections, h),
                };
                (h, text)
            })
            .collect();
        let fqcn = payload.class_name.clone();
        Self::finish(&fqcn, fqcn.clone(), source, texts, sources)
    }

    fn finish(
        fqcn: &str,
        class_name: String,
        source: String,
        texts: BTreeMap<SectionHeader, String>,
        sources: &ContextSources<'_>,
    ) -> Self {
        let sanitized_summary = sources
            .repo
            .load_preferring(fqcn, sources.languages)
            .map(|rule| rule.summary())
            .unwrap_or_else(|| NO_SANITIZED_FIELDS.to_string());

        let resolver = DependencyResolver::new(Arc::clone(sources.repo));
        let constraints = resolver.collect_constraints(fqcn, sources.languages);
        let ensures = resolver.collect_ensures(fqcn, sources.languages, sources.ensures_depth);

        Self {
            fqcn: fqcn.to_string(),
            dependency_constraints: format_constraints(&constraints),
            dependency_ensures: format_ensures(&class_name, &ensures),
            class_name,
            source,
            texts,
            sanitized_summary,
        }
    }

    pub fn text(&self, header: SectionHeader) -> &str {
        self.texts.get(&header).map(String::as_str).unwrap_or_default()
    }

    /// Sections fed to the retrieval query: SPEC through ENSURES.
    pub fn retrieval_sections(&self) -> Vec<(SectionHeader, String)> {
        SectionHeader::ALL
            .into_iter()
            .filter(|h| *h != SectionHeader::Forbidden)
            .map(|h| (h, self.text(h).to_string()))
            .collect()
    }

    /// `HEADER: text` for every section, one per line.
    pub fn crysl_summary(&self) -> String {
        SectionHeader::ALL
            .into_iter()
            .map(|h| format!("{h}: {}", self.text(h)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The raw source, cut to [`RAW_EXCERPT_CHARS`] characters.
    pub fn raw_excerpt(&self) -> String {
        match self.source.char_indices().nth(RAW_EXCERPT_CHARS) {
            Some((idx, _)) => format!("{}\n...", &self.source[..idx]),
            None => self.source.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cryslgen_rules::{InMemoryRules, SanitizedRule};

    const KEYGEN: &str = "SPEC javax.crypto.KeyGenerator\n\
        OBJECTS\n  int keySize;\n  java.lang.String alg;\n\
        EVENTS\n  g1: getInstance(alg);\n  i1: init(keySize);\n  gk: key = generateKey();\n\
        ORDER\n  g1, i1?, gk\n\
        CONSTRAINTS\n  alg in {\"AES\", \"HmacSHA256\"};\n\
        ENSURES\n  generatedKey[key, alg];\n";

    fn rule(json: &str) -> SanitizedRule {
        SanitizedRule::from_json(json).unwrap()
    }

    fn repo() -> Arc<dyn RuleRepository> {
        Arc::new(
            InMemoryRules::new()
                .with(
                    "javax.crypto.KeyGenerator",
                    "English",
                    rule(r#"{"dependency": ["java.security.SecureRandom"], "description": "Creates secret keys"}"#),
                )
                .with(
                    "java.security.SecureRandom",
                    "English",
                    rule(r#"{"ensures": ["randomized[this]"], "constraints": ["alg in {SHA1PRNG}"]}"#),
                ),
        )
    }

    fn sources<'a>(repo: &'a Arc<dyn RuleRepository>, languages: &'a [String]) -> ContextSources<'a> {
        ContextSources {
            repo,
            languages,
            ensures_depth: 1,
            mode: ParseMode::Lenient,
        }
    }

    #[test]
    fn assemble_from_source() {
        let repo = repo();
        let langs = vec!["English".to_string()];
        let ctx = RuleContext::assemble("javax.crypto.KeyGenerator", KEYGEN.into(), &sources(&repo, &langs));

        assert_eq!(ctx.class_name, "javax.crypto.KeyGenerator");
        assert_eq!(ctx.text(SectionHeader::Order), "g1, i1?, gk");
        assert_eq!(ctx.text(SectionHeader::Requires), "None");
        assert_eq!(ctx.text(SectionHeader::Forbidden), "N/A");
        assert!(ctx.sanitized_summary.contains("description: Creates secret keys"));
        assert!(ctx.dependency_constraints.contains("Dependency: java.security.SecureRandom"));
        assert!(ctx.dependency_ensures.contains("randomized[this]"));
    }

    #[test]
    fn missing_spec_falls_back_to_fqcn() {
        let repo: Arc<dyn RuleRepository> = Arc::new(InMemoryRules::new());
        let langs = vec!["English".to_string()];
        let ctx = RuleContext::assemble("a.b.Thing", "EVENTS\n  e1: go();".into(), &sources(&repo, &langs));

        assert_eq!(ctx.class_name, "a.b.Thing");
        assert_eq!(ctx.sanitized_summary, NO_SANITIZED_FIELDS);
        assert_eq!(ctx.dependency_constraints, "No dependency constraints supplied.");
    }

    #[test]
    fn retrieval_sections_skip_forbidden() {
        let repo = repo();
        let langs = vec!["English".to_string()];
        let ctx = RuleContext::assemble("javax.crypto.KeyGenerator", KEYGEN.into(), &sources(&repo, &langs));
        let sections = ctx.retrieval_sections();

        assert_eq!(sections.len(), 7);
        assert_eq!(sections[0], (SectionHeader::Spec, "javax.crypto.KeyGenerator".to_string()));
        assert!(sections.iter().all(|(h, _)| *h != SectionHeader::Forbidden));
        assert!(ctx.crysl_summary().starts_with("SPEC: javax.crypto.KeyGenerator\nOBJECTS: int keySize;"));
    }

    #[test]
    fn payload_parses_camel_case() {
        let payload = RulePayload::from_json(
            r#"{
                "className": "javax.crypto.Cipher",
                "objects": "None",
                "events": "g1: getInstance(transformation)",
                "constraints": ["alg in {AES}", "mode in {GCM}"],
                "exampleType": "secure",
                "explanationLanguage": "English"
            }"#,
        )
        .unwrap();

        assert_eq!(payload.class_name, "javax.crypto.Cipher");
        assert!(!payload.wants_insecure());
        assert_eq!(
            payload.field_text(SectionHeader::Constraints).as_deref(),
            Some("alg in {AES}, mode in {GCM}")
        );
        assert_eq!(payload.field_text(SectionHeader::Ensures), None);
    }

    #[test]
    fn payload_without_class_name_is_rejected() {
        let err = RulePayload::from_json(r#"{"objects": "None"}"#).unwrap_err();
        assert!(matches!(err, RuleError::InvalidPayload(msg) if msg.contains("className")));
    }

    #[test]
    fn crysl_sections_win_over_payload() {
        let payload = RulePayload::from_json(
            r#"{"className": "javax.crypto.KeyGenerator", "order": "payload order", "forbidden": "payload forbidden"}"#,
        )
        .unwrap();
        let repo = repo();
        let langs = vec!["English".to_string()];
        let ctx = RuleContext::from_payload(&payload, KEYGEN.into(), &sources(&repo, &langs));

        assert_eq!(ctx.text(SectionHeader::Order), "g1, i1?, gk");
        assert_eq!(ctx.text(SectionHeader::Forbidden), "payload forbidden");
        assert_eq!(ctx.text(SectionHeader::Requires), "N/A");
    }

    #[test]
    fn payload_alone_when_source_missing() {
        let payload = RulePayload::from_json(r#"{"className": "x.Y", "order": "a, b"}"#).unwrap();
        let repo: Arc<dyn RuleRepository> = Arc::new(InMemoryRules::new());
        let langs = vec!["English".to_string()];
        let ctx = RuleContext::from_payload(&payload, String::new(), &sources(&repo, &langs));

        assert_eq!(ctx.text(SectionHeader::Order), "a, b");
        assert_eq!(ctx.raw_excerpt(), "");
        assert!(payload.wants_insecure());
    }

    #[test]
    fn raw_excerpt_is_cut() {
        let repo: Arc<dyn RuleRepository> = Arc::new(InMemoryRules::new());
        let langs = vec!["English".to_string()];
        let long = format!("SPEC a.B\n{}", "x".repeat(RAW_EXCERPT_CHARS * 2));
        let ctx = RuleContext::assemble("a.B", long, &sources(&repo, &langs));

        let excerpt = ctx.raw_excerpt();
        assert!(excerpt.ends_with("\n..."));
        assert_eq!(excerpt.chars().count(), RAW_EXCERPT_CHARS + 4);
    }
}
