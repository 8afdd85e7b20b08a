//! Dependency resolution across sanitized rules.
//!
//! A rule's `dependency` list names other classes whose constraints and
//! guarantees matter when documenting it. Resolution keeps first-seen order,
//! never lists the target itself, and is safe on cyclic graphs.

use crate::store::RuleRepository;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Ordered dependency names with the entries collected for each.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySnapshot {
    /// Distinct names in first-visit order, target excluded.
    pub order: Vec<String>,
    /// Entries per name; a missing record maps to an empty list.
    pub entries: HashMap<String, Vec<String>>,
}

impl DependencySnapshot {
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Entries for `name`, empty when unknown.
    pub fn entries_for(&self, name: &str) -> &[String] {
        self.entries.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    fn push(&mut self, name: &str, entries: Vec<String>) {
        if !self.entries.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.entries.insert(name.to_string(), entries);
    }
}

/// Collects dependency constraints and guarantees from a [`RuleRepository`].
pub struct DependencyResolver {
    repo: Arc<dyn RuleRepository>,
}

impl DependencyResolver {
    pub fn new(repo: Arc<dyn RuleRepository>) -> Self {
        Self { repo }
    }

    /// Constraints of each direct dependency of `target`.
    ///
    /// Uses `constraints`, or `constraint` when the plural field is absent.
    pub fn collect_constraints(&self, target: &str, languages: &[String]) -> DependencySnapshot {
        let mut snapshot = DependencySnapshot::default();
        let Some(primary) = self.repo.load_preferring(target, languages) else {
            debug!(target, "No sanitized rule for target, no dependency constraints");
            return snapshot;
        };

        let mut seen = HashSet::new();
        for dep in primary.dependencies() {
            if dep == target || !seen.insert(dep.clone()) {
                continue;
            }
            let constraints = self
                .repo
                .load_preferring(&dep, languages)
                .map(|rule| rule.constraint_items())
                .unwrap_or_default();
            snapshot.push(&dep, constraints);
        }

        snapshot
    }

    /// Guarantees (`ensures`) of dependencies, following links up to `depth`
    /// levels. `depth` 1 means direct dependencies only; 0 is treated as 1.
    pub fn collect_ensures(&self, target: &str, languages: &[String], depth: usize) -> DependencySnapshot {
        let depth = depth.max(1);
        let mut snapshot = DependencySnapshot::default();
        let Some(primary) = self.repo.load_preferring(target, languages) else {
            debug!(target, "No sanitized rule for target, no dependency ensures");
            return snapshot;
        };

        let mut visited = HashSet::from([target.to_string()]);
        for dep in primary.dependencies() {
            self.visit_ensures(&dep, 1, depth, languages, &mut visited, &mut snapshot);
        }

        snapshot
    }

    fn visit_ensures(
        &self,
        name: &str,
        current_depth: usize,
        depth: usize,
        languages: &[String],
        visited: &mut HashSet<String>,
        snapshot: &mut DependencySnapshot,
    ) {
        if !visited.insert(name.to_string()) {
            return;
        }

        let Some(rule) = self.repo.load_preferring(name, languages) else {
            snapshot.push(name, Vec::new());
            return;
        };
        snapshot.push(name, rule.ensures_items());

        if current_depth < depth {
            for sub in rule.dependencies() {
                self.visit_ensures(&sub, current_depth + 1, depth, languages, visited, snapshot);
            }
        }
    }
}

/// Render a constraints snapshot as a prompt block.
pub fn format_constraints(snapshot: &DependencySnapshot) -> String {
    if snapshot.is_empty() {
        return "No dependency constraints supplied.".to_string();
    }

    snapshot
        .order
        .iter()
        .map(|dep| {
            let entries = snapshot.entries_for(dep);
            if entries.is_empty() {
                format!("Dependency: {dep}\n  - (no constraints available)")
            } else {
                let lines: Vec<String> = entries.iter().map(|c| format!("  - {c}")).collect();
                format!("Dependency: {dep}\n{}", lines.join("\n"))
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Render an ensures snapshot as a prompt block.
pub fn format_ensures(target: &str, snapshot: &DependencySnapshot) -> String {
    if snapshot.is_empty() {
        return format!("No dependent component guarantees were available for {target}.");
    }

    let mut lines = vec![
        format!("### How related components influence {target}"),
        "Below are the guarantees (postconditions) that related classes provide when used correctly. \
         Use these to explain why and how the primary class depends on them.\n"
            .to_string(),
    ];
    for dep in &snapshot.order {
        let entries = snapshot.entries_for(dep);
        if entries.is_empty() {
            lines.push(format!("- **{dep}**: *(no ensures available or file missing)*"));
            continue;
        }
        lines.push(format!("- **{dep}**:"));
        lines.extend(entries.iter().map(|e| format!("  - {e}")));
    }
    lines.join("\n")
}
