//! Retrieval over a reference document.
//!
//! The document is extracted page by page, chunked with overlap, embedded
//! through a [`Provider`](cryslgen_core::Provider), and stored in a flat
//! inner-product index. The index and chunks are cached on disk and reused
//! while the document and embedding model stay the same.

pub mod cache;
pub mod chunker;
pub mod extract;
pub mod index;
pub mod pipeline;

pub use chunker::{ChunkConfig, DocChunk, chunk_text, make_chunks};
pub use extract::{DocumentExtractor, PlainTextExtractor, extract_text, extractor_for};
pub use index::{EmbeddingIndex, SearchHit};
pub use pipeline::{
    EmbedMode, PdfRetrievalPipeline, QueryStrategy, RetrieveOptions, RetrievedContext,
    composite_query, keyword_query,
};
