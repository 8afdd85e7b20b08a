//! `cryslgen deps`: dependency constraints, guarantees and graph of a rule.

use cryslgen_rules::{
    DependencyGraph, DependencyResolver, RuleRepository, SanitizedRuleStore, format_constraints,
    format_ensures, preferred_languages,
};
use std::path::Path;
use std::sync::Arc;

pub fn run(
    config_path: Option<&Path>,
    class: &str,
    language: &str,
    ensures_depth: Option<usize>,
    graph: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let repo: Arc<dyn RuleRepository> = Arc::new(SanitizedRuleStore::new(&config.paths.sanitized_dir));
    let languages = preferred_languages(language, &config.dependencies.fallback_language);
    let depth = ensures_depth.unwrap_or(config.dependencies.ensures_depth);

    print!("{}", report(repo, class, &languages, depth, graph));
    Ok(())
}

fn report(repo: Arc<dyn RuleRepository>, class: &str, languages: &[String], depth: usize, graph: bool) -> String {
    let resolver = DependencyResolver::new(Arc::clone(&repo));
    let constraints = resolver.collect_constraints(class, languages);
    let ensures = resolver.collect_ensures(class, languages, depth);

    let mut out = format!("# {class}\n\n## Constraints\n{}\n\n", format_constraints(&constraints));
    out.push_str(&format!("## Guarantees\n{}\n", format_ensures(class, &ensures)));
    if graph {
        let graph = DependencyGraph::from_repository(repo.as_ref(), class, languages).sanitize(class, None);
        out.push_str(&format!("\n## Graph\n{}\n", graph.render()));
    }
    out
}
