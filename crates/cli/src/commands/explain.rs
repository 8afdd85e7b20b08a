//! `cryslgen explain`: developer guides for a batch of rules.

use cryslgen_generator::DocGenerator;
use std::path::Path;
use tracing::info;

pub async fn run(
    config_path: Option<&Path>,
    classes: &[String],
    language: &str,
    fresh: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let provider = super::provider(&config)?;
    let generator = DocGenerator::from_config(&config, provider).reuse_cached(!fresh);

    let outcomes = generator.explain_batch(classes, language).await;
    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(explanation) => {
                let origin = if explanation.from_cache { " (cached)" } else { "" };
                println!("# {} [{}]{origin}\n", explanation.class_name, explanation.language);
                println!("{}\n", explanation.text);
                if !explanation.sources.is_empty() {
                    println!("Sources: {}\n", explanation.sources.join(" "));
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("❌ {}: {e}", outcome.fqcn);
            }
        }
    }

    info!(rules = outcomes.len(), failed, "Batch finished");
    if failed > 0 {
        return Err(format!("{failed} of {} rule(s) failed", outcomes.len()).into());
    }
    Ok(())
}
