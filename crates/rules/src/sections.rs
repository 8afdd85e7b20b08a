//! Light section splitter for CrySL rule text.
//!
//! This is not a CrySL grammar. A rule is cut at its section headers and each
//! region becomes a list of trimmed, non-empty lines:
//!
//! ```text
//! SPEC javax.crypto.KeyGenerator
//! OBJECTS
//!     int keySize;
//! EVENTS
//!     g1: getInstance(alg);
//! ORDER
//!     g1, Init?, GenKey
//! ```
//!
//! Two modes exist. [`ParseMode::Lenient`] matches a header word anywhere on a
//! word boundary, so header words inside prose (`"... in ORDER to ..."`) start a
//! new section. [`ParseMode::LineAnchored`] only accepts a header at the start
//! of a line, optionally followed by a colon.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

const HEADER_ALTERNATION: &str = "SPEC|OBJECTS|EVENTS|ORDER|CONSTRAINTS|REQUIRES|ENSURES|FORBIDDEN";

static LENIENT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(&format!(r"\b({HEADER_ALTERNATION})\b")).ok());

static LINE_ANCHORED: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(&format!(r"(?m)^[ \t]*({HEADER_ALTERNATION})\b[ \t]*:?")).ok());

/// A recognized CrySL section header, in canonical rule order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SectionHeader {
    Spec,
    Objects,
    Events,
    Order,
    Constraints,
    Requires,
    Ensures,
    Forbidden,
}

impl SectionHeader {
    pub const ALL: [SectionHeader; 8] = [
        SectionHeader::Spec,
        SectionHeader::Objects,
        SectionHeader::Events,
        SectionHeader::Order,
        SectionHeader::Constraints,
        SectionHeader::Requires,
        SectionHeader::Ensures,
        SectionHeader::Forbidden,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionHeader::Spec => "SPEC",
            SectionHeader::Objects => "OBJECTS",
            SectionHeader::Events => "EVENTS",
            SectionHeader::Order => "ORDER",
            SectionHeader::Constraints => "CONSTRAINTS",
            SectionHeader::Requires => "REQUIRES",
            SectionHeader::Ensures => "ENSURES",
            SectionHeader::Forbidden => "FORBIDDEN",
        }
    }

    /// Match an exact header token.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|h| h.as_str() == token)
    }

    /// Text used when a rule has no such section at all.
    fn absent_text(&self) -> &'static str {
        match self {
            SectionHeader::Spec => "",
            SectionHeader::Objects | SectionHeader::Requires => "None",
            _ => "N/A",
        }
    }
}

impl fmt::Display for SectionHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header matching strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParseMode {
    /// Header words match anywhere on a word boundary.
    #[default]
    Lenient,
    /// Headers must begin a line; a trailing `:` is allowed.
    LineAnchored,
}

/// Sections of one rule. Headers missing from the source are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSections {
    sections: BTreeMap<SectionHeader, Vec<String>>,
}

impl RuleSections {
    pub fn get(&self, header: SectionHeader) -> Option<&[String]> {
        self.sections.get(&header).map(Vec::as_slice)
    }

    pub fn contains(&self, header: SectionHeader) -> bool {
        self.sections.contains_key(&header)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Present sections in canonical header order.
    pub fn iter(&self) -> impl Iterator<Item = (SectionHeader, &[String])> {
        self.sections.iter().map(|(h, lines)| (*h, lines.as_slice()))
    }

    /// Render one section for a prompt.
    ///
    /// Present sections are joined with newlines (`_no entries_` when the
    /// header exists but has no body). Absent sections get a fixed default.
    pub fn section_text(&self, header: SectionHeader) -> String {
        match self.sections.get(&header) {
            Some(lines) if lines.is_empty() => "_no entries_".to_string(),
            Some(lines) => lines.join("\n"),
            None => header.absent_text().to_string(),
        }
    }

    /// The class named by the SPEC section, if any.
    pub fn spec_class(&self) -> Option<&str> {
        self.sections
            .get(&SectionHeader::Spec)
            .and_then(|lines| lines.first())
            .map(String::as_str)
    }

    pub fn insert(&mut self, header: SectionHeader, lines: Vec<String>) {
        self.sections.insert(header, lines);
    }
}

/// Parse rule text in [`ParseMode::Lenient`] mode.
pub fn parse_sections(text: &str) -> RuleSections {
    parse_sections_with(text, ParseMode::Lenient)
}

/// Parse rule text with an explicit header matching mode.
///
/// A repeated header keeps only its last body.
pub fn parse_sections_with(text: &str, mode: ParseMode) -> RuleSections {
    let mut out = RuleSections::default();
    if text.trim().is_empty() {
        return out;
    }

    let pattern = match mode {
        ParseMode::Lenient => LENIENT.as_ref(),
        ParseMode::LineAnchored => LINE_ANCHORED.as_ref(),
    };
    let Some(re) = pattern else {
        return out;
    };

    // (header, body start, match start)
    let marks: Vec<(SectionHeader, usize, usize)> = re
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let header = SectionHeader::from_token(caps.get(1)?.as_str())?;
            Some((header, whole.end(), whole.start()))
        })
        .collect();

    for (i, (header, body_start, _)) in marks.iter().enumerate() {
        let body_end = marks.get(i + 1).map_or(text.len(), |next| next.2);
        let lines = text[*body_start..body_end]
            .trim()
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
        out.insert(*header, lines);
    }

    out
}
