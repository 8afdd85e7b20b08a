//! Build-or-load of the reference index, and query-time retrieval.

use crate::cache::{CacheKey, IndexCache, document_fingerprint};
use crate::chunker::{ChunkConfig, DocChunk, chunk_text, head_chars, make_chunks};
use crate::extract::{DocumentExtractor, extract_text};
use crate::index::EmbeddingIndex;
use cryslgen_core::error::{ProviderError, RetrievalError};
use cryslgen_core::provider::{EmbeddingRequest, Provider};
use cryslgen_rules::SectionHeader;
use regex_lite::Regex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

const CRYSL_HINT: &str = "\
CrySL semantics reminders:
- SPEC, OBJECTS, EVENTS, ORDER govern valid call sequences.
- CONSTRAINTS express parameter domains and helper functions (alg(), mode(), length()).
- Predicates (REQUIRES/ENSURES/NEGATES) encode dependency contracts between classes.
- FORBIDDEN calls highlight insecure API combinations.";

static TOKEN_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]+").ok());
static NUMBER_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\b\d+\b").ok());

/// How chunk texts are sent to the embedding provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmbedMode {
    /// One request carrying every chunk.
    #[default]
    Batched,
    /// One request per chunk, for backends that reject list input.
    PerItem,
}

/// How the retrieval query is built from rule sections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryStrategy {
    /// Vocabulary hint followed by each non-empty section.
    #[default]
    Composite,
    /// Distinct identifier tokens joined with ` | `.
    Keywords,
}

#[derive(Debug, Clone)]
pub struct RetrieveOptions {
    pub k: usize,
    /// Excerpt cap per chunk; 0 disables truncation.
    pub max_chunk_chars: usize,
    pub embedding_model: String,
    pub strategy: QueryStrategy,
}

impl RetrieveOptions {
    pub fn new(embedding_model: impl Into<String>) -> Self {
        Self {
            k: 6,
            max_chunk_chars: 900,
            embedding_model: embedding_model.into(),
            strategy: QueryStrategy::Composite,
        }
    }
}

/// Retrieved excerpts ready to be placed in a prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrievedContext {
    /// `[Cid] excerpt` entries separated by blank lines.
    pub block: String,
    /// `[Cid]` tags in rank order.
    pub tags: Vec<String>,
}

impl RetrievedContext {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Extract, chunk, embed and index a reference document.
pub struct PdfRetrievalPipeline {
    provider: Arc<dyn Provider>,
    extractor: Box<dyn DocumentExtractor>,
    chunking: ChunkConfig,
    embed_mode: EmbedMode,
}

impl PdfRetrievalPipeline {
    pub fn new(provider: Arc<dyn Provider>, extractor: Box<dyn DocumentExtractor>) -> Self {
        Self {
            provider,
            extractor,
            chunking: ChunkConfig::default(),
            embed_mode: EmbedMode::default(),
        }
    }

    pub fn with_chunking(mut self, chunking: ChunkConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_embed_mode(mut self, mode: EmbedMode) -> Self {
        self.embed_mode = mode;
        self
    }

    /// Reload the cached index for `document`, or build and cache a new one.
    ///
    /// Embedding failures are fatal. Cache write failures are only logged.
    pub async fn build_or_load_index(
        &self,
        document: &Path,
        cache_dir: &Path,
        embedding_model: &str,
    ) -> Result<(EmbeddingIndex, Vec<DocChunk>), RetrievalError> {
        let cache = IndexCache::new(cache_dir);
        let key = CacheKey {
            embedding_model: embedding_model.to_string(),
            document_sha256: document_fingerprint(document),
        };

        if let Some(hit) = cache.load(&key) {
            info!(chunks = hit.1.len(), cache = %cache_dir.display(), "Reusing cached reference index");
            return Ok(hit);
        }

        let text = extract_text(self.extractor.as_ref(), document)?;
        let chunks = make_chunks(chunk_text(&text, &self.chunking));
        info!(
            document = %document.display(),
            extractor = self.extractor.name(),
            chunks = chunks.len(),
            "Building reference index"
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embed_all(texts, embedding_model).await?;
        let index = EmbeddingIndex::build(vectors, chunks.iter().map(|c| c.id.clone()).collect())?;

        if let Err(e) = cache.save(&index, &chunks, &key) {
            warn!(error = %e, "Could not persist reference index cache");
        }
        Ok((index, chunks))
    }

    /// Embed the rule sections and return the best matching excerpts.
    ///
    /// An empty index or chunk list yields an empty context without calling
    /// the provider.
    pub async fn retrieve(
        &self,
        index: &EmbeddingIndex,
        chunks: &[DocChunk],
        sections: &[(SectionHeader, String)],
        options: &RetrieveOptions,
    ) -> Result<RetrievedContext, RetrievalError> {
        if index.is_empty() || chunks.is_empty() {
            return Ok(RetrievedContext::default());
        }

        let query = match options.strategy {
            QueryStrategy::Composite => composite_query(sections),
            QueryStrategy::Keywords => keyword_query(sections),
        };
        let Some(query_vec) = self
            .embed_all(vec![query], &options.embedding_model)
            .await?
            .into_iter()
            .next()
        else {
            return Ok(RetrievedContext::default());
        };

        let by_id: HashMap<&str, &DocChunk> = chunks.iter().map(|c| (c.id.as_str(), c)).collect();
        let mut context = RetrievedContext::default();
        let mut entries = Vec::new();
        for hit in index.search(&query_vec, options.k) {
            let Some(chunk) = by_id.get(hit.id.as_str()) else {
                warn!(id = %hit.id, "Index hit has no chunk record");
                continue;
            };
            let tag = format!("[{}]", chunk.id);
            let excerpt = truncate_excerpt(&normalize_chunk(&chunk.text), options.max_chunk_chars);
            debug!(tag = %tag, score = hit.score, "Retrieved reference chunk");
            entries.push(format!("{tag} {excerpt}"));
            context.tags.push(tag);
        }
        context.block = entries.join("\n\n");
        Ok(context)
    }

    /// Embed free text against an index, for ad-hoc searches.
    pub async fn search_text(
        &self,
        index: &EmbeddingIndex,
        query: &str,
        k: usize,
        embedding_model: &str,
    ) -> Result<Vec<crate::index::SearchHit>, RetrievalError> {
        if index.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.embed_all(vec![query.to_string()], embedding_model).await?;
        Ok(vectors
            .first()
            .map(|q| index.search(q, k))
            .unwrap_or_default())
    }

    async fn embed_all(&self, texts: Vec<String>, model: &str) -> Result<Vec<Vec<f32>>, RetrievalError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        match self.embed_mode {
            EmbedMode::Batched => self.embed_batch(texts, model).await,
            EmbedMode::PerItem => {
                let mut vectors = Vec::with_capacity(texts.len());
                for text in texts {
                    vectors.extend(self.embed_batch(vec![text], model).await?);
                }
                Ok(vectors)
            }
        }
    }

    async fn embed_batch(&self, inputs: Vec<String>, model: &str) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let expected = inputs.len();
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: model.to_string(),
                inputs,
            })
            .await?;

        if response.embeddings.len() != expected {
            return Err(ProviderError::InvalidResponse(format!(
                "{} returned {} embeddings for {expected} inputs",
                self.provider.name(),
                response.embeddings.len()
            ))
            .into());
        }
        Ok(response.embeddings)
    }
}

/// Vocabulary hint plus `SECTION:\ntext` for every non-empty section.
pub fn composite_query(sections: &[(SectionHeader, String)]) -> String {
    let mut parts = vec![CRYSL_HINT.to_string()];
    let mut ordered: Vec<&(SectionHeader, String)> = sections.iter().collect();
    ordered.sort_by_key(|(h, _)| *h);
    for (header, text) in ordered {
        let text = text.trim();
        if !text.is_empty() {
            parts.push(format!("{header}:\n{text}"));
        }
    }
    parts.join("\n\n")
}

/// Distinct identifier tokens (at least 3 chars) joined with ` | `.
///
/// ORDER is skipped; CONSTRAINTS also contributes its numbers.
pub fn keyword_query(sections: &[(SectionHeader, String)]) -> String {
    let (Some(token_re), Some(number_re)) = (TOKEN_RE.as_ref(), NUMBER_RE.as_ref()) else {
        return String::new();
    };

    let mut ordered: Vec<&(SectionHeader, String)> = sections
        .iter()
        .filter(|(h, _)| *h != SectionHeader::Order)
        .collect();
    ordered.sort_by_key(|(h, _)| *h);

    let mut seen = HashSet::new();
    let mut tokens = Vec::new();
    for (header, text) in ordered {
        let mut found: Vec<&str> = token_re.find_iter(text).map(|m| m.as_str()).collect();
        if *header == SectionHeader::Constraints {
            found.extend(number_re.find_iter(text).map(|m| m.as_str()));
        }
        for token in found {
            if token.chars().count() >= 3 && seen.insert(token.to_lowercase()) {
                tokens.push(token);
            }
        }
    }
    tokens.join(" | ")
}

/// Undo common PDF ligature and hyphenation artifacts.
fn normalize_chunk(text: &str) -> String {
    text.replace('\u{fb01}', "fi")
        .replace('\u{fb02}', "fl")
        .replace('\u{ad}', "")
        .trim()
        .to_string()
}

/// Cut at the last space before `max` characters and mark with ` ...`.
fn truncate_excerpt(text: &str, max: usize) -> String {
    if max == 0 || text.chars().count() <= max {
        return text.to_string();
    }
    let head = head_chars(text, max);
    let cut = head.rfind(char::is_whitespace).map_or(head, |i| &head[..i]);
    format!("{} ...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::PlainTextExtractor;
    use async_trait::async_trait;
    use cryslgen_core::message::Message;
    use cryslgen_core::provider::{EmbeddingResponse, ProviderRequest, ProviderResponse};
    use std::sync::Mutex;

    const VOCAB: [&str; 4] = ["cipher", "key", "random", "hash"];

    /// Bag-of-words embedder over a tiny vocabulary.
    struct WordCountEmbedder {
        calls: Mutex<Vec<usize>>,
        drop_one: bool,
    }

    impl WordCountEmbedder {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                drop_one: false,
            }
        }

        fn calls(&self) -> Vec<usize> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn embed_one(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut v: Vec<f32> = VOCAB
            .iter()
            .map(|w| lower.matches(w).count() as f32)
            .collect();
        v.push(0.01);
        v
    }

    #[async_trait]
    impl Provider for WordCountEmbedder {
        fn name(&self) -> &str {
            "word-count"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                message: Message::assistant(""),
                usage: None,
                model: request.model,
            })
        }

        async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
            self.calls.lock().unwrap().push(request.inputs.len());
            let mut embeddings: Vec<Vec<f32>> = request.inputs.iter().map(|t| embed_one(t)).collect();
            if self.drop_one {
                embeddings.pop();
            }
            Ok(EmbeddingResponse {
                embeddings,
                model: request.model,
                usage: None,
            })
        }
    }

    const DOC: &str = "\
The Cipher class encrypts data with a cipher key.
\x0c
SecureRandom provides random seeds; random values feed key generation.
\x0c
MessageDigest computes a hash. A hash is one-way.";

    fn write_doc(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("paper.txt");
        std::fs::write(&path, DOC).unwrap();
        path
    }

    fn pipeline(provider: Arc<WordCountEmbedder>) -> PdfRetrievalPipeline {
        PdfRetrievalPipeline::new(provider, Box::new(PlainTextExtractor)).with_chunking(ChunkConfig {
            max_chars: 80,
            overlap: 10,
        })
    }

    #[tokio::test]
    async fn builds_then_reuses_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = write_doc(tmp.path());
        let cache_dir = tmp.path().join("rag_cache");
        let provider = Arc::new(WordCountEmbedder::new());
        let pipeline = pipeline(provider.clone());

        let (index, chunks) = pipeline.build_or_load_index(&doc, &cache_dir, "emb").await.unwrap();
        assert_eq!(index.len(), chunks.len());
        assert!(chunks.len() >= 3);
        assert_eq!(provider.calls(), vec![chunks.len()]);

        let (again, again_chunks) = pipeline.build_or_load_index(&doc, &cache_dir, "emb").await.unwrap();
        assert_eq!(again.ids(), index.ids());
        assert_eq!(again_chunks, chunks);
        assert_eq!(provider.calls().len(), 1, "cache hit must not embed");
    }

    #[tokio::test]
    async fn changed_model_rebuilds() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = write_doc(tmp.path());
        let provider = Arc::new(WordCountEmbedder::new());
        let pipeline = pipeline(provider.clone());

        pipeline.build_or_load_index(&doc, tmp.path(), "emb-a").await.unwrap();
        pipeline.build_or_load_index(&doc, tmp.path(), "emb-b").await.unwrap();
        assert_eq!(provider.calls().len(), 2);
    }

    #[tokio::test]
    async fn per_item_mode_embeds_one_at_a_time() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = write_doc(tmp.path());
        let provider = Arc::new(WordCountEmbedder::new());
        let pipeline = pipeline(provider.clone()).with_embed_mode(EmbedMode::PerItem);

        let (index, _) = pipeline.build_or_load_index(&doc, tmp.path(), "emb").await.unwrap();
        let calls = provider.calls();
        assert_eq!(calls.len(), index.len());
        assert!(calls.iter().all(|n| *n == 1));
    }

    #[tokio::test]
    async fn empty_document_gives_empty_index_without_provider_call() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = tmp.path().join("empty.txt");
        std::fs::write(&doc, "\n \x0c\n").unwrap();
        let provider = Arc::new(WordCountEmbedder::new());

        let (index, chunks) = pipeline(provider.clone())
            .build_or_load_index(&doc, &tmp.path().join("c"), "emb")
            .await
            .unwrap();
        assert!(index.is_empty());
        assert!(chunks.is_empty());
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn wrong_embedding_count_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = write_doc(tmp.path());
        let provider = Arc::new(WordCountEmbedder {
            calls: Mutex::new(Vec::new()),
            drop_one: true,
        });

        let err = pipeline(provider)
            .build_or_load_index(&doc, tmp.path(), "emb")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::Embedding(ProviderError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn retrieve_ranks_matching_chunk_first() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = write_doc(tmp.path());
        let provider = Arc::new(WordCountEmbedder::new());
        let pipeline = pipeline(provider.clone());
        let (index, chunks) = pipeline.build_or_load_index(&doc, tmp.path(), "emb").await.unwrap();

        let sections = vec![
            (SectionHeader::Spec, "java.security.MessageDigest".to_string()),
            (SectionHeader::Ensures, "hash hash hash".to_string()),
        ];
        let options = RetrieveOptions {
            k: 1,
            ..RetrieveOptions::new("emb")
        };
        let ctx = pipeline.retrieve(&index, &chunks, &sections, &options).await.unwrap();

        assert_eq!(ctx.tags.len(), 1);
        assert!(ctx.block.starts_with(&ctx.tags[0]));
        assert!(ctx.block.contains("MessageDigest"));
    }

    #[tokio::test]
    async fn retrieve_on_empty_index_skips_provider() {
        let provider = Arc::new(WordCountEmbedder::new());
        let ctx = pipeline(provider.clone())
            .retrieve(
                &EmbeddingIndex::default(),
                &[],
                &[(SectionHeader::Spec, "x".into())],
                &RetrieveOptions::new("emb"),
            )
            .await
            .unwrap();
        assert!(ctx.is_empty());
        assert!(ctx.block.is_empty());
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn composite_query_skips_empty_sections_in_header_order() {
        let q = composite_query(&[
            (SectionHeader::Order, "g1, i1".into()),
            (SectionHeader::Spec, "javax.crypto.Cipher".into()),
            (SectionHeader::Objects, "  ".into()),
        ]);
        assert!(q.starts_with("CrySL semantics reminders:"));
        let spec = q.find("SPEC:\njavax.crypto.Cipher").unwrap();
        let order = q.find("ORDER:\ng1, i1").unwrap();
        assert!(spec < order);
        assert!(!q.contains("OBJECTS:"));
        assert_eq!(q, format!("{CRYSL_HINT}\n\nSPEC:\njavax.crypto.Cipher\n\nORDER:\ng1, i1"));
    }

    #[test]
    fn keyword_query_dedupes_and_keeps_constraint_numbers() {
        let q = keyword_query(&[
            (SectionHeader::Constraints, "keySize in {128, 256, 64}".into()),
            (SectionHeader::Spec, "javax.crypto.KeyGenerator".into()),
            (SectionHeader::Objects, "int keysize; KeyGenerator gen".into()),
            (SectionHeader::Order, "ignored_order_token".into()),
        ]);
        assert_eq!(
            q,
            "javax | crypto | KeyGenerator | int | keysize | gen | 128 | 256"
        );
    }

    #[test]
    fn truncation_cuts_at_whitespace() {
        assert_eq!(truncate_excerpt("short text", 900), "short text");
        assert_eq!(truncate_excerpt("alpha beta gamma", 12), "alpha beta ...");
        assert_eq!(truncate_excerpt("abcdefghij", 4), "abcd ...");
    }

    #[test]
    fn ligatures_are_normalised() {
        assert_eq!(normalize_chunk(" e\u{fb03}\u{fb01}cient \u{fb02}ow of da\u{ad}ta "), "e\u{fb03}ficient flow of data");
    }
}
