//! `cryslgen index`: build or query the reference document index.

use cryslgen_config::AppConfig;
use cryslgen_generator::retrieval_from_config;
use cryslgen_retrieval::{DocChunk, EmbeddingIndex, PdfRetrievalPipeline, RetrieveOptions};
use std::collections::HashMap;
use std::path::Path;

const PREVIEW_CHARS: usize = 160;

async fn load(
    config: &AppConfig,
) -> Result<(PdfRetrievalPipeline, RetrieveOptions, EmbeddingIndex, Vec<DocChunk>), Box<dyn std::error::Error>> {
    let document = &config.paths.reference_document;
    if !document.exists() {
        return Err(format!("Reference document not found: {}", document.display()).into());
    }

    let provider = super::provider(config)?;
    let (pipeline, options) = retrieval_from_config(config, provider)?;
    let (index, chunks) = pipeline
        .build_or_load_index(document, &config.paths.index_cache_dir, &options.embedding_model)
        .await?;
    Ok((pipeline, options, index, chunks))
}

pub async fn build(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let (_, options, index, chunks) = load(&config).await?;

    println!("✅ Reference index ready");
    println!("   Document:  {}", config.paths.reference_document.display());
    println!("   Cache:     {}", config.paths.index_cache_dir.display());
    println!("   Model:     {}", options.embedding_model);
    println!("   Chunks:    {}", chunks.len());
    println!("   Dimension: {}", index.dim());
    Ok(())
}

pub async fn search(
    config_path: Option<&Path>,
    query: &str,
    k: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let (pipeline, options, index, chunks) = load(&config).await?;

    let k = k.unwrap_or(options.k);
    let hits = pipeline
        .search_text(&index, query, k, &options.embedding_model)
        .await?;
    if hits.is_empty() {
        println!("No matches.");
        return Ok(());
    }

    let by_id: HashMap<&str, &DocChunk> = chunks.iter().map(|c| (c.id.as_str(), c)).collect();
    for hit in hits {
        let excerpt = by_id
            .get(hit.id.as_str())
            .map(|c| preview(&c.text))
            .unwrap_or_default();
        println!("[{}] {:.4}  {excerpt}", hit.id, hit.score);
    }
    Ok(())
}

/// Chunk text on one line, cut to `PREVIEW_CHARS`.
fn preview(text: &str) -> String {
    let folded = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if folded.chars().count() <= PREVIEW_CHARS {
        return folded;
    }
    let cut: String = folded.chars().take(PREVIEW_CHARS).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_folds_whitespace() {
        assert_eq!(preview("A cipher\n  needs\ta key."), "A cipher needs a key.");
    }

    #[test]
    fn preview_truncates_long_chunks() {
        let text = "word ".repeat(100);
        let p = preview(&text);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
    }
}
