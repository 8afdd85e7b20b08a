//! `cryslgen doctor`: check configuration, inputs and the provider.

use cryslgen_config::{AppConfig, LOCAL_CONFIG_FILE};
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 cryslgen Doctor: Setup Diagnostics");
    println!("=====================================\n");

    let mut issues = 0;

    let located = config_path.is_some()
        || Path::new(LOCAL_CONFIG_FILE).exists()
        || AppConfig::config_dir().join("config.toml").exists();
    if !located {
        println!("  ⚠️  No config file, using defaults. Run `cryslgen init`");
        issues += 1;
    }

    let config = match super::load_config(config_path) {
        Ok(config) => {
            println!("  ✅ Config valid (provider: {}, model: {})", config.provider, config.model);
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Fix the config before running other checks.");
            return Ok(());
        }
    };

    let needs_key = config.provider != "ollama" && !config.provider.starts_with("custom:");
    if needs_key && !config.has_api_key() {
        println!("  ⚠️  No API key for '{}'. Set api_key or CRYSLGEN_API_KEY", config.provider);
        issues += 1;
    } else {
        println!("  ✅ Credentials");
    }

    let paths = &config.paths;
    for (label, dir) in [("Rules directory", &paths.rules_dir), ("Sanitized rules", &paths.sanitized_dir)] {
        if dir.is_dir() {
            println!("  ✅ {label}: {}", dir.display());
        } else {
            println!("  ❌ {label} missing: {}", dir.display());
            issues += 1;
        }
    }

    if !config.retrieval.enabled {
        println!("  ➖ Retrieval disabled");
    } else if paths.reference_document.exists() {
        println!("  ✅ Reference document: {}", paths.reference_document.display());
    } else {
        println!(
            "  ⚠️  Reference document missing, prompts will have no excerpts: {}",
            paths.reference_document.display()
        );
        issues += 1;
    }

    match super::provider(&config) {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => println!("  ✅ Provider '{}' reachable", provider.name()),
            Ok(false) => {
                println!("  ⚠️  Provider '{}' responded but reported unhealthy", provider.name());
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Provider '{}' unreachable: {e}", provider.name());
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
