//! `cryslgen sections`: show how a `.crysl` file splits into sections.

use cryslgen_rules::{ParseMode, RuleSections, parse_sections_with};
use std::path::Path;

pub fn run(file: &Path, strict: bool, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(file)
        .map_err(|e| format!("Cannot read {}: {e}", file.display()))?;
    let mode = if strict { ParseMode::LineAnchored } else { ParseMode::Lenient };
    let sections = parse_sections_with(&text, mode);

    if json {
        println!("{}", serde_json::to_string_pretty(&sections)?);
    } else {
        print!("{}", render(&sections));
    }
    Ok(())
}

fn render(sections: &RuleSections) -> String {
    if sections.is_empty() {
        return "No sections found.\n".to_string();
    }
    let mut out = String::new();
    for (header, lines) in sections.iter() {
        out.push_str(&format!("{header}\n"));
        for line in lines {
            out.push_str(&format!("  {line}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cryslgen_rules::parse_sections;

    #[test]
    fn renders_in_header_order() {
        let sections = parse_sections("SPEC java.security.MessageDigest\nORDER\n  g, u*, d\nEVENTS\n  g: getInstance(alg);\n");
        assert_eq!(
            render(&sections),
            "SPEC\n  java.security.MessageDigest\nEVENTS\n  g: getInstance(alg);\nORDER\n  g, u*, d\n"
        );
    }

    #[test]
    fn empty_source() {
        assert_eq!(render(&parse_sections("")), "No sections found.\n");
    }
}
