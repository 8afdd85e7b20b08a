//! The generation driver.

use crate::cache::ExplanationCache;
use crate::context::{ContextSources, RuleContext, RulePayload};
use crate::output::clean_llm_output;
use crate::prompts;
use cryslgen_config::{AppConfig, QueryStyle};
use cryslgen_core::error::{RetrievalError, RuleError};
use cryslgen_core::message::Message;
use cryslgen_core::provider::{Provider, ProviderRequest};
use cryslgen_retrieval::{
    ChunkConfig, DocChunk, EmbedMode, EmbeddingIndex, PdfRetrievalPipeline, QueryStrategy,
    RetrieveOptions, RetrievedContext, extractor_for,
};
use cryslgen_rules::{
    ParseMode, RuleRepository, SanitizedRuleStore, SectionHeader, load_crysl_source,
    preferred_languages,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Model and lookup settings for a generator.
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub rules_dir: PathBuf,
    pub fallback_language: String,
    pub ensures_depth: usize,
    pub parse_mode: ParseMode,
    /// Return cached explanations without calling the provider.
    pub reuse_cached: bool,
}

impl GeneratorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            rules_dir: config.paths.rules_dir.clone(),
            fallback_language: config.dependencies.fallback_language.clone(),
            ensures_depth: config.dependencies.ensures_depth,
            parse_mode: ParseMode::Lenient,
            reuse_cached: true,
        }
    }
}

/// A generated (or cached) explanation.
#[derive(Debug, Clone, PartialEq)]
pub struct Explanation {
    pub class_name: String,
    pub language: String,
    pub text: String,
    /// Reference chunk tags placed in the prompt.
    pub sources: Vec<String>,
    pub from_cache: bool,
}

/// Per-rule result of a batch run.
#[derive(Debug)]
pub struct BatchOutcome {
    pub fqcn: String,
    pub result: cryslgen_core::Result<Explanation>,
}

struct Retrieval {
    pipeline: PdfRetrievalPipeline,
    document: PathBuf,
    cache_dir: PathBuf,
    options: RetrieveOptions,
    index: OnceCell<Option<(EmbeddingIndex, Vec<DocChunk>)>>,
}

/// Retrieval pipeline and query options for the configured reference document.
pub fn retrieval_from_config(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
) -> Result<(PdfRetrievalPipeline, RetrieveOptions), RetrievalError> {
    let r = &config.retrieval;
    let extractor = extractor_for(&config.paths.reference_document)?;
    let pipeline = PdfRetrievalPipeline::new(provider, extractor)
        .with_chunking(ChunkConfig {
            max_chars: r.chunk_max_chars,
            overlap: r.chunk_overlap,
        })
        .with_embed_mode(if r.batch_embeddings { EmbedMode::Batched } else { EmbedMode::PerItem });
    let options = RetrieveOptions {
        k: r.top_k,
        max_chunk_chars: r.max_chunk_chars,
        embedding_model: config.embedding_model.clone(),
        strategy: match r.query {
            QueryStyle::Composite => QueryStrategy::Composite,
            QueryStyle::Keywords => QueryStrategy::Keywords,
        },
    };
    Ok((pipeline, options))
}

/// Drives explanation and example generation for CrySL rules.
pub struct DocGenerator {
    provider: Arc<dyn Provider>,
    repo: Arc<dyn RuleRepository>,
    cache: Option<ExplanationCache>,
    retrieval: Option<Retrieval>,
    settings: GeneratorSettings,
}

impl DocGenerator {
    pub fn new(provider: Arc<dyn Provider>, repo: Arc<dyn RuleRepository>, settings: GeneratorSettings) -> Self {
        Self {
            provider,
            repo,
            cache: None,
            retrieval: None,
            settings,
        }
    }

    /// Wire everything from configuration: sanitized store, explanation
    /// cache, and retrieval when enabled and the document is usable.
    pub fn from_config(config: &AppConfig, provider: Arc<dyn Provider>) -> Self {
        let repo: Arc<dyn RuleRepository> = Arc::new(SanitizedRuleStore::new(&config.paths.sanitized_dir));
        let mut generator = Self::new(Arc::clone(&provider), repo, GeneratorSettings::from_config(config))
            .with_cache(ExplanationCache::new(&config.paths.explanation_cache_dir));

        let document = &config.paths.reference_document;
        if !config.retrieval.enabled {
            debug!("Retrieval disabled by configuration");
        } else if !document.exists() {
            info!(document = %document.display(), "Reference document not found, skipping retrieval");
        } else {
            match retrieval_from_config(config, provider) {
                Ok((pipeline, options)) => {
                    generator = generator.with_retrieval(pipeline, document, &config.paths.index_cache_dir, options);
                }
                Err(e) => warn!(error = %e, "Retrieval disabled"),
            }
        }
        generator
    }

    pub fn with_cache(mut self, cache: ExplanationCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Ground prompts in excerpts from `document`. The index is built (or
    /// loaded from `cache_dir`) on first use.
    pub fn with_retrieval(
        mut self,
        pipeline: PdfRetrievalPipeline,
        document: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
        options: RetrieveOptions,
    ) -> Self {
        self.retrieval = Some(Retrieval {
            pipeline,
            document: document.into(),
            cache_dir: cache_dir.into(),
            options,
            index: OnceCell::new(),
        });
        self
    }

    /// Toggle reuse of cached explanations.
    pub fn reuse_cached(mut self, reuse: bool) -> Self {
        self.settings.reuse_cached = reuse;
        self
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    fn languages(&self, language: &str) -> Vec<String> {
        preferred_languages(language, &self.settings.fallback_language)
    }

    fn sources<'a>(&'a self, languages: &'a [String]) -> ContextSources<'a> {
        ContextSources {
            repo: &self.repo,
            languages,
            ensures_depth: self.settings.ensures_depth,
            mode: self.settings.parse_mode,
        }
    }

    /// Reference excerpts for a rule. Any failure means no excerpts.
    async fn reference(&self, sections: &[(SectionHeader, String)]) -> RetrievedContext {
        let Some(r) = &self.retrieval else {
            return RetrievedContext::default();
        };

        let loaded = r
            .index
            .get_or_init(|| async {
                match r
                    .pipeline
                    .build_or_load_index(&r.document, &r.cache_dir, &r.options.embedding_model)
                    .await
                {
                    Ok(loaded) => Some(loaded),
                    Err(e) => {
                        warn!(error = %e, "Reference index unavailable, continuing without retrieval");
                        None
                    }
                }
            })
            .await;
        let Some((index, chunks)) = loaded else {
            return RetrievedContext::default();
        };

        match r.pipeline.retrieve(index, chunks, sections, &r.options).await {
            Ok(context) => context,
            Err(e) => {
                warn!(error = %e, "Retrieval failed, continuing without reference material");
                RetrievedContext::default()
            }
        }
    }

    async fn complete(&self, messages: Vec<Message>) -> cryslgen_core::Result<String> {
        let request = ProviderRequest::new(&self.settings.model, messages)
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_tokens);
        let response = self.provider.complete(request).await?;
        if let Some(usage) = &response.usage {
            debug!(
                model = %response.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Completion finished"
            );
        }
        Ok(response.message.content)
    }

    /// Explain one rule in `language`.
    ///
    /// A cached explanation is returned as-is when reuse is enabled. Missing
    /// rule sources and provider failures are errors; retrieval problems only
    /// drop the reference material.
    pub async fn explain(&self, fqcn: &str, language: &str) -> cryslgen_core::Result<Explanation> {
        let cached = match &self.cache {
            Some(cache) if self.settings.reuse_cached => cache.read(fqcn, language),
            _ => String::new(),
        };
        if !cached.is_empty() {
            debug!(class = %fqcn, language, "Using cached explanation");
            return Ok(Explanation {
                class_name: fqcn.to_string(),
                language: language.to_string(),
                text: cached,
                sources: Vec::new(),
                from_cache: true,
            });
        }

        let source = load_crysl_source(&self.settings.rules_dir, fqcn)?;
        let languages = self.languages(language);
        let ctx = RuleContext::assemble(fqcn, source, &self.sources(&languages));
        let reference = self.reference(&ctx.retrieval_sections()).await;

        info!(class = %ctx.class_name, language, references = reference.tags.len(), "Generating explanation");
        let messages = prompts::with_reference(
            prompts::EXPLAIN_SYSTEM,
            &reference.block,
            prompts::explanation_prompt(&ctx, language),
        );
        let text = clean_llm_output(&self.complete(messages).await?);

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.write(fqcn, language, &text) {
                warn!(class = %fqcn, error = %e, "Could not cache explanation");
            }
        }

        Ok(Explanation {
            class_name: ctx.class_name,
            language: language.to_string(),
            text,
            sources: reference.tags,
            from_cache: false,
        })
    }

    /// Explain several rules one after another. A failing rule is reported in
    /// its outcome and the batch carries on.
    pub async fn explain_batch(&self, fqcns: &[String], language: &str) -> Vec<BatchOutcome> {
        let mut outcomes = Vec::with_capacity(fqcns.len());
        for fqcn in fqcns {
            let result = self.explain(fqcn, language).await;
            if let Err(e) = &result {
                warn!(class = %fqcn, error = %e, "Explanation failed");
            }
            outcomes.push(BatchOutcome {
                fqcn: fqcn.clone(),
                result,
            });
        }
        outcomes
    }

    fn payload_context(&self, payload: &RulePayload, languages: &[String]) -> RuleContext {
        let source = match load_crysl_source(&self.settings.rules_dir, &payload.class_name) {
            Ok(source) => source,
            Err(RuleError::SourceNotFound { path, .. }) => {
                warn!(path = %path.display(), "No CrySL source, using payload fields only");
                String::new()
            }
            Err(e) => {
                warn!(error = %e, "CrySL source unreadable, using payload fields only");
                String::new()
            }
        };
        RuleContext::from_payload(payload, source, &self.sources(languages))
    }

    /// Secure usage example for the rule described by the payload at `payload_path`.
    pub async fn secure_example(&self, payload_path: &Path, language: &str) -> cryslgen_core::Result<String> {
        let payload = RulePayload::from_file(payload_path)?;
        let languages = self.languages(language);
        let ctx = self.payload_context(&payload, &languages);

        let explanation = self
            .cache
            .as_ref()
            .map(|cache| cache.read_preferring(&ctx.fqcn, &languages))
            .unwrap_or_default();
        let reference = self.reference(&ctx.retrieval_sections()).await;

        info!(class = %ctx.class_name, references = reference.tags.len(), "Generating secure example");
        let messages = prompts::with_reference(
            prompts::SECURE_SYSTEM,
            &reference.block,
            prompts::secure_prompt(&ctx, &explanation),
        );
        Ok(self.complete(messages).await?.trim().to_string())
    }

    /// Insecure counter-example for the rule described by the payload at `payload_path`.
    pub async fn insecure_example(&self, payload_path: &Path) -> cryslgen_core::Result<String> {
        let payload = RulePayload::from_file(payload_path)?;
        if !payload.wants_insecure() {
            warn!(
                class = %payload.class_name,
                example_type = payload.example_type.as_deref().unwrap_or_default(),
                "Payload asks for a secure example, generating an insecure one anyway"
            );
        }
        let languages = self.languages(&self.settings.fallback_language);
        let ctx = self.payload_context(&payload, &languages);

        info!(class = %ctx.class_name, "Generating insecure example");
        let messages = vec![
            Message::system(prompts::INSECURE_SYSTEM),
            Message::user(prompts::insecure_prompt(&ctx)),
        ];
        Ok(self.complete(messages).await?.trim().to_string())
    }
}
