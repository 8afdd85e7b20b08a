//! On-disk cache for a built index.
//!
//! Layout under the cache directory:
//!
//! ```text
//! vectors.bin    u32 rows, u32 dim, rows * dim f32 (all little-endian)
//! ids.json       ["C0", "C1", ...]
//! chunks.json    [{"id": "C0", "text": "..."}, ...]
//! manifest.json  {"embedding_model", "document_sha256", "chunk_count", "created_at"}
//! ```
//!
//! The first three files must all be present, parse, and agree in length.
//! Anything else is a cache miss, never an error.

use crate::chunker::DocChunk;
use crate::index::EmbeddingIndex;
use chrono::{DateTime, Utc};
use cryslgen_core::error::RetrievalError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const VECTORS_FILE: &str = "vectors.bin";
const IDS_FILE: &str = "ids.json";
const CHUNKS_FILE: &str = "chunks.json";
const MANIFEST_FILE: &str = "manifest.json";

/// What the cached index was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheManifest {
    pub embedding_model: String,
    pub document_sha256: Option<String>,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Identity of the current build request, compared against the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub embedding_model: String,
    /// `None` when the document could not be read for fingerprinting.
    pub document_sha256: Option<String>,
}

/// Index artifacts in one directory.
#[derive(Debug, Clone)]
pub struct IndexCache {
    dir: PathBuf,
}

impl IndexCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reload a consistent, current cache.
    ///
    /// Returns `None` (after a warning) when artifacts are missing, corrupt,
    /// disagree in length, or were built for another model or document.
    pub fn load(&self, key: &CacheKey) -> Option<(EmbeddingIndex, Vec<DocChunk>)> {
        let paths = [VECTORS_FILE, IDS_FILE, CHUNKS_FILE].map(|f| self.dir.join(f));
        if !paths.iter().all(|p| p.exists()) {
            debug!(dir = %self.dir.display(), "No index cache");
            return None;
        }

        if let Some(manifest) = self.read_manifest() {
            if manifest.embedding_model != key.embedding_model {
                warn!(
                    cached = %manifest.embedding_model,
                    requested = %key.embedding_model,
                    "Index cache built with another embedding model, rebuilding"
                );
                return None;
            }
            if key.document_sha256.is_some() && manifest.document_sha256 != key.document_sha256 {
                warn!(dir = %self.dir.display(), "Reference document changed, rebuilding index cache");
                return None;
            }
        }

        let vectors = match read_vectors(&paths[0]) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Unreadable cached vectors, rebuilding");
                return None;
            }
        };
        let ids: Vec<String> = read_json(&paths[1])?;
        let chunks: Vec<DocChunk> = read_json(&paths[2])?;

        if vectors.len() != ids.len() || ids.len() != chunks.len() {
            warn!(
                vectors = vectors.len(),
                ids = ids.len(),
                chunks = chunks.len(),
                "Inconsistent index cache, rebuilding"
            );
            return None;
        }

        match EmbeddingIndex::build(vectors, ids) {
            Ok(index) => {
                debug!(dir = %self.dir.display(), chunks = chunks.len(), "Loaded index cache");
                Some((index, chunks))
            }
            Err(e) => {
                warn!(error = %e, "Cached vectors rejected, rebuilding");
                None
            }
        }
    }

    /// Persist the index, its chunks, and a manifest for `key`.
    pub fn save(&self, index: &EmbeddingIndex, chunks: &[DocChunk], key: &CacheKey) -> Result<(), RetrievalError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| self.cache_error(&self.dir, e))?;

        let vectors_path = self.dir.join(VECTORS_FILE);
        std::fs::write(&vectors_path, encode_vectors(index)).map_err(|e| self.cache_error(&vectors_path, e))?;

        self.write_json(IDS_FILE, &index.ids())?;
        self.write_json(CHUNKS_FILE, &chunks)?;
        self.write_json(
            MANIFEST_FILE,
            &CacheManifest {
                embedding_model: key.embedding_model.clone(),
                document_sha256: key.document_sha256.clone(),
                chunk_count: chunks.len(),
                created_at: Utc::now(),
            },
        )?;
        debug!(dir = %self.dir.display(), chunks = chunks.len(), "Saved index cache");
        Ok(())
    }

    pub fn read_manifest(&self) -> Option<CacheManifest> {
        let path = self.dir.join(MANIFEST_FILE);
        if !path.exists() {
            return None;
        }
        read_json(&path)
    }

    fn write_json<T: Serialize + ?Sized>(&self, file: &str, value: &T) -> Result<(), RetrievalError> {
        let path = self.dir.join(file);
        let json = serde_json::to_string(value).map_err(|e| RetrievalError::Cache {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        std::fs::write(&path, json).map_err(|e| self.cache_error(&path, e))
    }

    fn cache_error(&self, path: &Path, e: std::io::Error) -> RetrievalError {
        RetrievalError::Cache {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    }
}

/// Hex SHA-256 of a file, `None` if it cannot be read.
pub fn document_fingerprint(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    Some(hex::encode(Sha256::digest(&bytes)))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read cache file");
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt cache file");
            None
        }
    }
}

fn encode_vectors(index: &EmbeddingIndex) -> Vec<u8> {
    let rows = index.len();
    let dim = index.dim();
    let mut out = Vec::with_capacity(8 + rows * dim * 4);
    out.extend_from_slice(&(rows as u32).to_le_bytes());
    out.extend_from_slice(&(dim as u32).to_le_bytes());
    for row in index.rows() {
        for x in row {
            out.extend_from_slice(&x.to_le_bytes());
        }
    }
    out
}

fn read_vectors(path: &Path) -> Result<Vec<Vec<f32>>, String> {
    let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
    decode_vectors(&bytes)
}

fn decode_vectors(bytes: &[u8]) -> Result<Vec<Vec<f32>>, String> {
    let word = |at: usize| -> Result<[u8; 4], String> {
        bytes
            .get(at..at + 4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| format!("truncated at byte {at}"))
    };

    let rows = u32::from_le_bytes(word(0)?) as usize;
    let dim = u32::from_le_bytes(word(4)?) as usize;
    let Some(expected) = rows
        .checked_mul(dim)
        .and_then(|n| n.checked_mul(4))
        .and_then(|n| n.checked_add(8))
    else {
        return Err(format!("{rows}x{dim} header does not describe a valid matrix"));
    };
    if bytes.len() != expected {
        return Err(format!(
            "{rows}x{dim} matrix needs {expected} bytes, file has {}",
            bytes.len()
        ));
    }

    Ok(bytes[8..]
        .chunks_exact(dim.max(1) * 4)
        .take(rows)
        .map(|row| {
            row.chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(model: &str, sha: Option<&str>) -> CacheKey {
        CacheKey {
            embedding_model: model.into(),
            document_sha256: sha.map(String::from),
        }
    }

    fn built() -> (EmbeddingIndex, Vec<DocChunk>) {
        let index = EmbeddingIndex::build(
            vec![vec![0.3, -1.2, 4.0], vec![1.0, 1.0, 1.0]],
            vec!["C0".into(), "C1".into()],
        )
        .unwrap();
        let chunks = vec![
            DocChunk { id: "C0".into(), text: "first".into() },
            DocChunk { id: "C1".into(), text: "second".into() },
        ];
        (index, chunks)
    }

    #[test]
    fn round_trip_preserves_ids_and_vectors() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(tmp.path().join("rag_cache"));
        let (index, chunks) = built();
        let k = key("text-embedding-3-small", Some("abc"));

        cache.save(&index, &chunks, &k).unwrap();
        let (loaded, loaded_chunks) = cache.load(&k).unwrap();

        assert_eq!(loaded.ids(), index.ids());
        assert_eq!(loaded_chunks, chunks);
        for (a, b) in loaded.rows().zip(index.rows()) {
            for (x, y) in a.iter().zip(b) {
                assert!((x - y).abs() < 1e-6);
            }
        }
        assert_eq!(cache.read_manifest().unwrap().chunk_count, 2);
    }

    #[test]
    fn missing_artifact_is_a_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(tmp.path());
        let (index, chunks) = built();
        let k = key("m", None);
        cache.save(&index, &chunks, &k).unwrap();

        std::fs::remove_file(tmp.path().join(IDS_FILE)).unwrap();
        assert!(cache.load(&k).is_none());
    }

    #[test]
    fn length_disagreement_is_a_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(tmp.path());
        let (index, chunks) = built();
        let k = key("m", None);
        cache.save(&index, &chunks, &k).unwrap();

        std::fs::write(tmp.path().join(CHUNKS_FILE), r#"[{"id":"C0","text":"only"}]"#).unwrap();
        assert!(cache.load(&k).is_none());
    }

    #[test]
    fn truncated_vectors_are_a_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(tmp.path());
        let (index, chunks) = built();
        let k = key("m", None);
        cache.save(&index, &chunks, &k).unwrap();

        let path = tmp.path().join(VECTORS_FILE);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();
        assert!(cache.load(&k).is_none());
    }

    #[test]
    fn oversized_header_is_a_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(tmp.path());
        let (index, chunks) = built();
        let k = key("m", None);
        cache.save(&index, &chunks, &k).unwrap();

        let mut bytes = vec![0xFF; 8];
        bytes.extend_from_slice(&[0; 8]);
        std::fs::write(tmp.path().join(VECTORS_FILE), bytes).unwrap();
        assert!(cache.load(&k).is_none());
    }

    #[test]
    fn nan_vectors_are_a_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(tmp.path());
        let (index, chunks) = built();
        let k = key("m", None);
        cache.save(&index, &chunks, &k).unwrap();

        let path = tmp.path().join(VECTORS_FILE);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[8..12].copy_from_slice(&f32::NAN.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();
        assert!(cache.load(&k).is_none());
    }

    #[test]
    fn manifest_mismatch_is_stale() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(tmp.path());
        let (index, chunks) = built();
        cache.save(&index, &chunks, &key("m1", Some("aaa"))).unwrap();

        assert!(cache.load(&key("m2", Some("aaa"))).is_none());
        assert!(cache.load(&key("m1", Some("bbb"))).is_none());
        assert!(cache.load(&key("m1", None)).is_some());
    }

    #[test]
    fn cache_without_manifest_is_accepted() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(tmp.path());
        let (index, chunks) = built();
        cache.save(&index, &chunks, &key("m1", Some("aaa"))).unwrap();
        std::fs::remove_file(tmp.path().join(MANIFEST_FILE)).unwrap();

        assert!(cache.load(&key("other", Some("zzz"))).is_some());
    }

    #[test]
    fn fingerprint_tracks_content() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("doc.txt");
        std::fs::write(&path, "one").unwrap();
        let first = document_fingerprint(&path).unwrap();
        assert_eq!(first.len(), 64);

        std::fs::write(&path, "two").unwrap();
        assert_ne!(document_fingerprint(&path).unwrap(), first);
        assert!(document_fingerprint(&tmp.path().join("missing")).is_none());
    }
}
