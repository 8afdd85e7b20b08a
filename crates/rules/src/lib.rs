//! CrySL rule handling for cryslgen.
//!
//! - [`sections`] splits raw `.crysl` text into typed sections.
//! - [`store`] loads sanitized per-language rule records from disk.
//! - [`resolver`] walks `dependency` links to collect constraints and guarantees.
//! - [`graph`] cleans a dependency graph (self-loops, unreachable nodes, cycles).

pub mod graph;
pub mod model;
pub mod resolver;
pub mod sections;
pub mod store;

pub use graph::{Adjacency, DependencyGraph};
pub use model::{RuleField, SanitizedRule, clean_item};
pub use resolver::{DependencyResolver, DependencySnapshot, format_constraints, format_ensures};
pub use sections::{ParseMode, RuleSections, SectionHeader, parse_sections, parse_sections_with};
pub use store::{
    InMemoryRules, RuleRepository, SanitizedRuleStore, load_crysl_source, preferred_languages,
    simple_name,
};
