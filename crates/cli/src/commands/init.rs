//! `cryslgen init`: write a default `cryslgen.toml` in the working directory.

use cryslgen_config::{AppConfig, LOCAL_CONFIG_FILE};
use std::path::{Path, PathBuf};

pub fn run(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔐 cryslgen: Setup");
    println!("==================\n");

    match write_default(Path::new("."), force)? {
        Some(path) => {
            println!("✅ Created {}", path.display());
            println!("\n📝 Next steps:");
            println!("   1. Set `provider`, `model` and `api_key` (or CRYSLGEN_API_KEY)");
            println!("   2. Point [paths] at your CrySL rules and sanitized records");
            println!("   3. Run `cryslgen doctor` to check the setup");
        }
        None => {
            println!("⚠️  {LOCAL_CONFIG_FILE} already exists.");
            println!("   Edit it manually or re-run with --force.");
        }
    }
    Ok(())
}

/// Write the default config into `dir`. `None` when a file exists and
/// `force` is not set.
fn write_default(dir: &Path, force: bool) -> std::io::Result<Option<PathBuf>> {
    let path = dir.join(LOCAL_CONFIG_FILE);
    if path.exists() && !force {
        return Ok(None);
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    Ok(Some(path))
}
