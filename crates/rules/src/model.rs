//! Sanitized rule records.
//!
//! The upstream documentation pipeline writes one JSON file per class and
//! language. Field shapes vary between producers (a constraint may be a single
//! string, a list, or a keyed map), so every field is a [`RuleField`].
//! Unknown keys are ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One loosely shaped record field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleField {
    Text(String),
    List(Vec<Value>),
    Map(Map<String, Value>),
    Other(Value),
}

impl RuleField {
    /// Normalise into cleaned, non-blank items.
    ///
    /// Map entries render as `key: value`.
    pub fn items(&self) -> Vec<String> {
        match self {
            RuleField::Text(s) => non_blank(clean_item(s)),
            RuleField::List(values) => values
                .iter()
                .map(|v| clean_item(&render(v)))
                .filter(|s| !s.is_empty())
                .collect(),
            RuleField::Map(map) => map
                .iter()
                .map(|(k, v)| format!("{k}: {}", clean_item(&render(v))))
                .collect(),
            RuleField::Other(value) => non_blank(clean_item(&render(value))),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RuleField::Text(s) => s.trim().is_empty(),
            RuleField::List(values) => values.is_empty(),
            RuleField::Map(map) => map.is_empty(),
            RuleField::Other(value) => value.is_null(),
        }
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn non_blank(s: String) -> Vec<String> {
    if s.is_empty() { Vec::new() } else { vec![s] }
}

/// Trim, then drop stray leading commas (with any spaces between them).
pub fn clean_item(s: &str) -> String {
    s.trim_start_matches(|c: char| c == ',' || c.is_whitespace())
        .trim_end()
        .to_string()
}

/// A sanitized rule for one (class, language) pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SanitizedRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency: Option<RuleField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects: Option<RuleField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<RuleField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<RuleField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<RuleField>,
    /// Singular spelling used by some producers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<RuleField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<RuleField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ensures: Option<RuleField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negates: Option<RuleField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forbidden: Option<RuleField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<RuleField>,
}

impl SanitizedRule {
    /// Parse a record from JSON text.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Declared dependency class names, in file order.
    pub fn dependencies(&self) -> Vec<String> {
        field_items(&self.dependency)
    }

    /// `constraints`, falling back to `constraint` when the plural is absent.
    pub fn constraint_items(&self) -> Vec<String> {
        match (&self.constraints, &self.constraint) {
            (Some(c), _) => c.items(),
            (None, Some(c)) => c.items(),
            (None, None) => Vec::new(),
        }
    }

    pub fn ensures_items(&self) -> Vec<String> {
        field_items(&self.ensures)
    }

    fn fields(&self) -> [(&'static str, &Option<RuleField>); 10] {
        [
            ("objects", &self.objects),
            ("events", &self.events),
            ("order", &self.order),
            ("constraints", &self.constraints),
            ("constraint", &self.constraint),
            ("requires", &self.requires),
            ("ensures", &self.ensures),
            ("negates", &self.negates),
            ("forbidden", &self.forbidden),
            ("description", &self.description),
        ]
    }

    /// Human-readable dump of every populated field except `dependency`.
    pub fn summary(&self) -> String {
        let parts: Vec<String> = self
            .fields()
            .into_iter()
            .filter_map(|(key, field)| {
                let field = field.as_ref().filter(|f| !f.is_empty())?;
                match field {
                    RuleField::Text(_) | RuleField::Other(_) => {
                        let item = field.items().into_iter().next()?;
                        Some(format!("{key}: {item}"))
                    }
                    RuleField::List(_) | RuleField::Map(_) => {
                        let lines: Vec<String> =
                            field.items().into_iter().map(|i| format!("- {i}")).collect();
                        (!lines.is_empty()).then(|| format!("{key}:\n{}", lines.join("\n")))
                    }
                }
            })
            .collect();

        if parts.is_empty() {
            "No sanitized fields supplied.".to_string()
        } else {
            parts.join("\n\n")
        }
    }
}

fn field_items(field: &Option<RuleField>) -> Vec<String> {
    field.as_ref().map(RuleField::items).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_item_strips_leading_commas() {
        assert_eq!(clean_item("  , , keySize >= 128 "), "keySize >= 128");
        assert_eq!(clean_item(",,alg in {AES}"), "alg in {AES}");
        assert_eq!(clean_item("plain"), "plain");
        assert_eq!(clean_item("   "), "");
    }

    #[test]
    fn fields_accept_varied_shapes() {
        let rule = SanitizedRule::from_json(
            r#"{
                "dependency": ["javax.crypto.SecretKey", "java.security.SecureRandom"],
                "constraint": "alg in {AES}",
                "ensures": ["generatedKey[key, alg]", "  ", ",randomized[r]"],
                "forbidden": {"getInstance(String)": "insecure default"},
                "className": "ignored",
                "keySize": 128
            }"#,
        )
        .unwrap();

        assert_eq!(
            rule.dependencies(),
            vec!["javax.crypto.SecretKey", "java.security.SecureRandom"]
        );
        assert_eq!(rule.constraint_items(), vec!["alg in {AES}"]);
        assert_eq!(rule.ensures_items(), vec!["generatedKey[key, alg]", "randomized[r]"]);
        assert_eq!(
            rule.forbidden.as_ref().unwrap().items(),
            vec!["getInstance(String): insecure default"]
        );
    }

    #[test]
    fn list_items_are_cleaned_before_blank_check() {
        let field: RuleField = serde_json::from_str(r#"["A", ",", ", ", " ,B"]"#).unwrap();
        assert_eq!(field.items(), vec!["A", "B"]);
    }

    #[test]
    fn plural_constraints_win_over_singular() {
        let rule = SanitizedRule::from_json(
            r#"{"constraints": ["a", "b"], "constraint": "ignored"}"#,
        )
        .unwrap();
        assert_eq!(rule.constraint_items(), vec!["a", "b"]);
    }

    #[test]
    fn non_string_scalars_render_as_json() {
        let rule = SanitizedRule::from_json(r#"{"ensures": [42, true, ""]}"#).unwrap();
        assert_eq!(rule.ensures_items(), vec!["42", "true"]);
        let rule = SanitizedRule::from_json(r#"{"ensures": 7}"#).unwrap();
        assert_eq!(rule.ensures_items(), vec!["7"]);
    }

    #[test]
    fn null_fields_are_absent() {
        let rule = SanitizedRule::from_json(r#"{"ensures": null, "dependency": null}"#).unwrap();
        assert!(rule.ensures.is_none());
        assert!(rule.dependencies().is_empty());
    }

    #[test]
    fn summary_renders_populated_fields() {
        let rule = SanitizedRule::from_json(
            r#"{
                "dependency": ["x.Y"],
                "objects": "int keySize",
                "constraints": ["keySize in {128, 256}", ""],
                "forbidden": {"init(int)": "weak"},
                "ensures": []
            }"#,
        )
        .unwrap();

        let summary = rule.summary();
        assert_eq!(
            summary,
            "objects: int keySize\n\nconstraints:\n- keySize in {128, 256}\n\nforbidden:\n- init(int): weak"
        );
        assert!(!summary.contains("x.Y"));
    }

    #[test]
    fn empty_summary_placeholder() {
        let rule = SanitizedRule::from_json(r#"{"dependency": ["a.B"], "ensures": "  "}"#).unwrap();
        assert_eq!(rule.summary(), "No sanitized fields supplied.");
    }
}
