//! `cryslgen example`: secure or insecure usage code for one rule payload.

use cryslgen_generator::DocGenerator;
use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    payload: &Path,
    insecure: bool,
    language: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let provider = super::provider(&config)?;
    let generator = DocGenerator::from_config(&config, provider);

    let code = if insecure {
        generator.insecure_example(payload).await?
    } else {
        generator.secure_example(payload, language).await?
    };
    println!("{code}");
    Ok(())
}
