//! Prompt builders.
//!
//! Each builder renders a [`RuleContext`] into the user message for one kind
//! of output. Retrieved reference material never goes into the user message;
//! it is attached as a separate system message by [`with_reference`].

use crate::context::RuleContext;
use cryslgen_core::message::Message;
use cryslgen_rules::SectionHeader;

pub const EXPLAIN_SYSTEM: &str = "You are a patient teacher who explains cryptographic APIs \
to Java developers in plain, practical language.";

pub const SECURE_SYSTEM: &str = "You are a careful Java cryptography engineer. Write \
production-quality code, prefer constant-time primitives and use only the official JCA/JCE API.";

pub const INSECURE_SYSTEM: &str = "You are a Java security instructor preparing counter-examples \
that show how a cryptographic API is commonly misused.";

const REFERENCE_PREAMBLE: &str = "REFERENCE MATERIAL (background only; do not quote, cite or mention it):";

/// System message carrying retrieved excerpts, if there are any.
pub fn reference_message(block: &str) -> Option<Message> {
    let block = block.trim();
    (!block.is_empty()).then(|| Message::system(format!("{REFERENCE_PREAMBLE}\n{block}")))
}

/// `[system, reference?, user]`.
pub fn with_reference(system: &str, reference_block: &str, user: String) -> Vec<Message> {
    let mut messages = vec![Message::system(system)];
    messages.extend(reference_message(reference_block));
    messages.push(Message::user(user));
    messages
}

fn section_lines(ctx: &RuleContext) -> String {
    SectionHeader::ALL
        .into_iter()
        .filter(|h| *h != SectionHeader::Spec)
        .map(|h| format!("- {h}: {}", ctx.text(h)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Developer guide for one rule, written in `language`.
pub fn explanation_prompt(ctx: &RuleContext, language: &str) -> String {
    format!(
        r#"Explain how to use `{class}` correctly, based on its CrySL rule.

Rule sections:
{sections}
- Dependency constraints (reference only):
{dep_constraints}
- Dependency guarantees:
{dep_ensures}
- Sanitized rule notes:
{sanitized}
- Original CrySL:
{raw}

Write a tutorial-style guide for Java developers. Never show CrySL notation, event labels
(such as g1 or i2) or abstract parameter names; describe the actual calls and values instead.

Use exactly these headings, each starting with `## `:
## Overview
## Correct Usage
## Parameters and Constraints
## Method Variations and Use Cases
## Security Requirements
## Related Components & Their Guarantees
## Common Mistakes to Avoid
## Quick Reference Checklist

Under "Related Components & Their Guarantees", connect each dependency guarantee above to
the step of `{class}` usage where it matters. Turn REQUIRES and ENSURES predicates into
plain preconditions and postconditions, and FORBIDDEN entries into warnings.

Respond in **{language}** and be as precise as possible."#,
        class = ctx.class_name,
        sections = section_lines(ctx),
        dep_constraints = ctx.dependency_constraints,
        dep_ensures = ctx.dependency_ensures,
        sanitized = ctx.sanitized_summary,
        raw = ctx.source.trim(),
    )
}

/// One self-contained secure usage example.
pub fn secure_prompt(ctx: &RuleContext, cached_explanation: &str) -> String {
    let explanation = if cached_explanation.trim().is_empty() {
        "No narrative explanation cached."
    } else {
        cached_explanation.trim()
    };
    format!(
        r#"Write one self-contained, secure Java example that uses `{class}`.

Background (do not quote verbatim):
- CrySL summary:
{summary}
- Sanitized constraints:
{sanitized}
- Cached explanation:
{explanation}
- Dependency guarantees:
{dep_ensures}
- Dependency constraints:
{dep_constraints}
- Raw CrySL (excerpt):
{raw}

Requirements:
1. Follow the call order `{order}` exactly, using real API calls.
2. Enforce every constraint at runtime and pick the strongest allowed option.
3. Check REQUIRES predicates as preconditions; note ENSURES predicates as postconditions.
4. Never call anything listed under FORBIDDEN.
5. Explain security-relevant choices in short `//` comments.
6. Use real values, no placeholders.
7. Output only Java code inside one ```java block."#,
        class = ctx.class_name,
        summary = ctx.crysl_summary(),
        sanitized = ctx.sanitized_summary,
        dep_ensures = ctx.dependency_ensures,
        dep_constraints = ctx.dependency_constraints,
        raw = ctx.raw_excerpt(),
        order = ctx.text(SectionHeader::Order),
    )
}

/// A realistic example that deliberately violates the rule.
pub fn insecure_prompt(ctx: &RuleContext) -> String {
    format!(
        r#"Write an insecure but compilable Java example that uses `{class}`.

The CrySL rule below describes correct usage; the example must break it:
{sections}

Guidelines:
- Use parameter values the rule does not allow.
- Break the required call order.
- Use forbidden methods where the rule lists any.
- Leave required preconditions unmet.

Mark every insecure choice with a `//` comment saying why it is insecure.
Output only the annotated Java code."#,
        class = ctx.class_name,
        sections = section_lines(ctx),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextSources, RuleContext};
    use cryslgen_core::message::Role;
    use cryslgen_rules::{InMemoryRules, ParseMode, RuleRepository};
    use std::sync::Arc;

    fn context() -> RuleContext {
        let repo: Arc<dyn RuleRepository> = Arc::new(InMemoryRules::new());
        let langs = vec!["English".to_string()];
        let sources = ContextSources {
            repo: &repo,
            languages: &langs,
            ensures_depth: 1,
            mode: ParseMode::Lenient,
        };
        RuleContext::assemble(
            "java.security.MessageDigest",
            "SPEC java.security.MessageDigest\nORDER\n  g1, u*, d\nFORBIDDEN\n  digest(byte[]) => d;".into(),
            &sources,
        )
    }

    #[test]
    fn explanation_prompt_carries_rule_and_language() {
        let prompt = explanation_prompt(&context(), "German");
        assert!(prompt.contains("`java.security.MessageDigest`"));
        assert!(prompt.contains("- ORDER: g1, u*, d"));
        assert!(prompt.contains("- OBJECTS: None"));
        assert!(prompt.contains("No dependent component guarantees were available"));
        assert!(prompt.contains("Respond in **German**"));
    }

    #[test]
    fn secure_prompt_uses_order_and_explanation() {
        let ctx = context();
        let prompt = secure_prompt(&ctx, "");
        assert!(prompt.contains("Follow the call order `g1, u*, d`"));
        assert!(prompt.contains("No narrative explanation cached."));

        let prompt = secure_prompt(&ctx, "  ## Overview\nHashes data.  ");
        assert!(prompt.contains("## Overview\nHashes data."));
    }

    #[test]
    fn insecure_prompt_lists_forbidden() {
        let prompt = insecure_prompt(&context());
        assert!(prompt.contains("- FORBIDDEN: digest(byte[]) => d;"));
    }

    #[test]
    fn reference_goes_in_system_message() {
        let messages = with_reference(EXPLAIN_SYSTEM, "[C0] CrySL paper text", "explain".into());
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, Role::System);
        assert!(messages[1].content.ends_with("[C0] CrySL paper text"));
        assert_eq!(messages[2].role, Role::User);

        let messages = with_reference(EXPLAIN_SYSTEM, "  ", "explain".into());
        assert_eq!(messages.len(), 2);
        assert!(reference_message("").is_none());
    }
}
