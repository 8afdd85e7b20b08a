//! Post-processing of raw model output.

/// Remove stray code-fence lines (```` ``` ```` or ```` ```lang ````) and trim.
///
/// Markdown headings and everything else are kept as-is.
pub fn clean_llm_output(text: &str) -> String {
    text.lines()
        .map(|line| if is_fence(line) { "" } else { line })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn is_fence(line: &str) -> bool {
    let Some(rest) = line.strip_prefix("```") else {
        return false;
    };
    let rest = rest.trim_end();
    rest.chars().all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences_keeps_headings() {
        let raw = "```markdown\n## Overview\nCipher encrypts data.\n```\n";
        assert_eq!(clean_llm_output(raw), "## Overview\nCipher encrypts data.");
    }

    #[test]
    fn inline_backticks_survive() {
        let raw = "  Call `init()` first.\n``` not a fence\n";
        assert_eq!(clean_llm_output(raw), "Call `init()` first.\n``` not a fence");
    }

    #[test]
    fn indented_fence_is_content() {
        assert_eq!(clean_llm_output("a\n  ```\nb"), "a\n  ```\nb");
    }

    #[test]
    fn empty_output() {
        assert_eq!(clean_llm_output("```\n```"), "");
    }
}
