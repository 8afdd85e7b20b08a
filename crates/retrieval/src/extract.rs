//! Page-level text extraction for the reference document.
//!
//! Plain-text documents are always supported. PDF extraction goes through
//! PDFium and needs the `pdf` feature plus a PDFium shared library (looked up
//! next to the binary, under `resources/pdfium/`, or via
//! `PDFIUM_DYNAMIC_LIB_PATH`).

use cryslgen_core::error::RetrievalError;
use std::path::Path;

/// Extracts the text of a document as one string per page.
pub trait DocumentExtractor: Send + Sync {
    fn name(&self) -> &str;

    /// Extract every page. A page that fails on its own yields `""`.
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, RetrievalError>;
}

/// Extract and merge all pages of `path`, one newline between pages.
pub fn extract_text(extractor: &dyn DocumentExtractor, path: &Path) -> Result<String, RetrievalError> {
    Ok(extractor.extract_pages(path)?.join("\n"))
}

/// Plain text file; form feeds separate pages.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl DocumentExtractor for PlainTextExtractor {
    fn name(&self) -> &str {
        "text"
    }

    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, RetrievalError> {
        let bytes = std::fs::read(path).map_err(|e| RetrievalError::Extraction {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let text = String::from_utf8_lossy(&bytes);
        Ok(text.split('\x0c').map(String::from).collect())
    }
}

/// Pick an extractor from the file extension.
pub fn extractor_for(path: &Path) -> Result<Box<dyn DocumentExtractor>, RetrievalError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "txt" | "text" | "md" => Ok(Box::new(PlainTextExtractor)),
        #[cfg(feature = "pdf")]
        "pdf" => Ok(Box::new(pdf::PdfiumExtractor::new())),
        _ => Err(RetrievalError::UnsupportedDocument(path.to_path_buf())),
    }
}

#[cfg(feature = "pdf")]
pub use pdf::PdfiumExtractor;

#[cfg(feature = "pdf")]
mod pdf {
    use super::DocumentExtractor;
    use cryslgen_core::error::RetrievalError;
    use pdfium_render::prelude::Pdfium;
    use std::path::{Path, PathBuf};
    use tracing::warn;

    /// PDF extraction through a dynamically loaded PDFium.
    pub struct PdfiumExtractor {
        library_dir: Option<PathBuf>,
    }

    impl Default for PdfiumExtractor {
        fn default() -> Self {
            Self::new()
        }
    }

    impl PdfiumExtractor {
        pub fn new() -> Self {
            Self {
                library_dir: Self::find_library_dir(),
            }
        }

        /// Use PDFium from an explicit directory.
        pub fn with_library_dir(dir: impl Into<PathBuf>) -> Self {
            Self {
                library_dir: Some(dir.into()),
            }
        }

        fn find_library_dir() -> Option<PathBuf> {
            if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
                let p = PathBuf::from(path);
                if p.is_dir() {
                    return Some(p);
                }
                if let Some(parent) = p.parent().filter(|_| p.exists()) {
                    return Some(parent.to_path_buf());
                }
            }

            let candidates = [PathBuf::from("resources/pdfium"), PathBuf::from(".")];
            for dir in candidates {
                if dir.join(Pdfium::pdfium_platform_library_name()).exists() {
                    return Some(dir);
                }
            }

            std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf))
                .filter(|dir| dir.join(Pdfium::pdfium_platform_library_name()).exists())
        }

        pub fn is_available(&self) -> bool {
            self.library_dir.is_some()
        }
    }

    impl DocumentExtractor for PdfiumExtractor {
        fn name(&self) -> &str {
            "pdfium"
        }

        fn extract_pages(&self, path: &Path) -> Result<Vec<String>, RetrievalError> {
            let extraction_error = |reason: String| RetrievalError::Extraction {
                path: path.to_path_buf(),
                reason,
            };

            let dir = self
                .library_dir
                .as_ref()
                .ok_or_else(|| extraction_error("PDFium library not found".into()))?;
            let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
                .map_err(|e| extraction_error(format!("failed to load PDFium: {e}")))?;
            let pdfium = Pdfium::new(bindings);

            let document = pdfium
                .load_pdf_from_file(path, None)
                .map_err(|e| extraction_error(format!("failed to open PDF: {e}")))?;

            let mut pages = Vec::new();
            for (number, page) in document.pages().iter().enumerate() {
                match page.text() {
                    Ok(text) => pages.push(text.all()),
                    Err(e) => {
                        warn!(page = number + 1, error = %e, "Page text extraction failed, using empty text");
                        pages.push(String::new());
                    }
                }
            }
            Ok(pages)
        }
    }
}
