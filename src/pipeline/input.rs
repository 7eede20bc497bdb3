//! Input resolution and PDF text extraction.
//!
//! A user-supplied path or URL is normalised to a local PDF file, checked for
//! the `%PDF` magic bytes, and its text layer is read with `pdf-extract`.
//! URLs are downloaded into a `TempDir` that lives inside [`ResolvedInput`],
//! so the file disappears when the input is dropped.
//!
//! `pdf-extract` is CPU-bound and can panic on unusual fonts, so extraction
//! runs on the blocking pool behind `catch_unwind`.

use crate::error::Pdf2GraphError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

const PDF_MAGIC: &[u8; 4] = b"%PDF";
const FALLBACK_DOWNLOAD_NAME: &str = "downloaded.pdf";

/// A PDF on local disk, ready for text extraction.
#[derive(Debug)]
pub enum ResolvedInput {
    Local(PathBuf),
    /// Fetched from a URL. Dropping this removes the scratch directory.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            Self::Local(path) | Self::Downloaded { path, .. } => path,
        }
    }

    /// File name without extension; used as the default graph title.
    pub fn title(&self) -> String {
        self.path()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    }
}

/// Text pulled out of a PDF.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    /// Cleaned text, ready for the validator.
    pub text: String,
    /// Character count before cleanup.
    pub raw_chars: usize,
    pub file_name: String,
}

/// `http://` and `https://` inputs are fetched; anything else is a path.
pub fn is_url(input: &str) -> bool {
    ["http://", "https://"].iter().any(|scheme| input.starts_with(scheme))
}

/// Turn a CLI/API input string into a local PDF.
///
/// # Errors
/// * [`Pdf2GraphError::FileNotFound`] / [`Pdf2GraphError::NotAPdf`] for paths.
/// * [`Pdf2GraphError::DownloadFailed`] / [`Pdf2GraphError::DownloadTimeout`] for URLs.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2GraphError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Leading bytes that are not `%PDF`. Files shorter than four bytes pass
/// here and fail later in extraction.
fn foreign_magic(head: &[u8]) -> Option<[u8; 4]> {
    let head: [u8; 4] = head.get(..4)?.try_into().ok()?;
    (&head != PDF_MAGIC).then_some(head)
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, Pdf2GraphError> {
    use std::io::Read;

    let path = PathBuf::from(path_str);
    let Ok(file) = std::fs::File::open(&path) else {
        return Err(Pdf2GraphError::FileNotFound { path });
    };

    let mut head = Vec::with_capacity(PDF_MAGIC.len());
    // A read error leaves `head` short, which is treated like a tiny file.
    let _ = file.take(PDF_MAGIC.len() as u64).read_to_end(&mut head);
    if let Some(magic) = foreign_magic(&head) {
        return Err(Pdf2GraphError::NotAPdf { path, magic });
    }

    debug!("Using local PDF {}", path.display());
    Ok(ResolvedInput::Local(path))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2GraphError> {
    let failed = |reason: String| Pdf2GraphError::DownloadFailed {
        url: url.to_string(),
        reason,
    };
    let classify = |e: reqwest::Error| {
        if e.is_timeout() {
            Pdf2GraphError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    };

    info!("Fetching {} (timeout {}s)", url, timeout_secs);
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(classify)?;
    let status = response.status();
    if !status.is_success() {
        return Err(failed(format!("HTTP {status}")));
    }
    let body = response.bytes().await.map_err(classify)?;

    let temp_dir = TempDir::new().map_err(|e| Pdf2GraphError::Internal(e.to_string()))?;
    let path = temp_dir.path().join(filename_from_url(url));

    if let Some(magic) = foreign_magic(&body) {
        return Err(Pdf2GraphError::NotAPdf { path, magic });
    }

    tokio::fs::write(&path, &body)
        .await
        .map_err(|e| Pdf2GraphError::OutputWriteFailed {
            path: path.clone(),
            source: e,
        })?;
    info!("Fetched {} bytes into {}", body.len(), path.display());

    Ok(ResolvedInput::Downloaded {
        path,
        _temp_dir: temp_dir,
    })
}

/// Last URL path segment when it has an extension, else a fixed name.
fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()?
                .next_back()
                .filter(|seg| seg.contains('.'))
                .map(str::to_string)
        })
        .unwrap_or_else(|| FALLBACK_DOWNLOAD_NAME.to_string())
}

/// Extract and clean the text layer of a local PDF.
///
/// # Errors
/// * [`Pdf2GraphError::TextExtractionFailed`] — unreadable file or parser failure.
/// * [`Pdf2GraphError::EmptyDocument`] — nothing left after cleanup.
pub async fn extract_text(pdf_path: &Path) -> Result<ExtractedText, Pdf2GraphError> {
    let path = pdf_path.to_path_buf();

    tokio::task::spawn_blocking(move || extract_text_blocking(&path))
        .await
        .map_err(|e| Pdf2GraphError::Internal(format!("Extraction task panicked: {}", e)))?
}

fn extract_text_blocking(pdf_path: &Path) -> Result<ExtractedText, Pdf2GraphError> {
    let bytes = std::fs::read(pdf_path).map_err(|e| Pdf2GraphError::TextExtractionFailed {
        path: pdf_path.to_path_buf(),
        detail: e.to_string(),
    })?;
    debug!("PDF file size: {} bytes", bytes.len());

    let raw = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(&bytes)
    })) {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            return Err(Pdf2GraphError::TextExtractionFailed {
                path: pdf_path.to_path_buf(),
                detail: e.to_string(),
            })
        }
        Err(_) => {
            warn!("pdf-extract panicked on {}", pdf_path.display());
            return Err(Pdf2GraphError::TextExtractionFailed {
                path: pdf_path.to_path_buf(),
                detail: "parser panicked (malformed fonts or glyphs?)".into(),
            });
        }
    };

    let raw_chars = raw.chars().count();
    let text = clean_text(&raw);
    if text.is_empty() {
        return Err(Pdf2GraphError::EmptyDocument {
            path: pdf_path.to_path_buf(),
        });
    }

    info!(
        "Extracted {} chars ({} before cleanup) from {}",
        text.chars().count(),
        raw_chars,
        pdf_path.display()
    );

    Ok(ExtractedText {
        text,
        raw_chars,
        file_name: pdf_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    })
}

// ── Text cleanup ─────────────────────────────────────────────────────────

static RE_PAGE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)page \d+ of \d+").unwrap());

static RE_BARE_PAGE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*\d+\s*$").unwrap());

static RE_BOILERPLATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*(?:©|confidential|draft\b).*$").unwrap());

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Remove page markers, bare page-number lines, and copyright/confidential/
/// draft boilerplate lines, then collapse all whitespace runs to one space.
pub fn clean_text(input: &str) -> String {
    let s = RE_PAGE_MARKER.replace_all(input, "");
    let s = RE_BARE_PAGE_NUMBER.replace_all(&s, "");
    let s = RE_BOILERPLATE.replace_all(&s, "");
    RE_WHITESPACE.replace_all(&s, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_need_an_http_scheme() {
        assert!(is_url("https://arxiv.org/pdf/1706.03762"));
        assert!(is_url("http://localhost:8000/lecture.pdf"));
        for path in ["lecture.pdf", "./uploads/a.pdf", "ftp://host/a.pdf", ""] {
            assert!(!is_url(path), "{path:?} treated as URL");
        }
    }

    #[test]
    fn magic_check() {
        assert_eq!(foreign_magic(b"%PDF-1.7"), None);
        assert_eq!(foreign_magic(b"%PD"), None);
        assert_eq!(foreign_magic(b"<html>"), Some(*b"<htm"));
    }

    #[test]
    fn filename_from_url_uses_last_segment() {
        assert_eq!(filename_from_url("https://arxiv.org/pdf/paper.pdf"), "paper.pdf");
        assert_eq!(filename_from_url("https://arxiv.org/pdf/1706.03762"), "1706.03762");
        assert_eq!(filename_from_url("https://example.com/"), "downloaded.pdf");
    }

    #[test]
    fn clean_text_strips_markers_and_whitespace() {
        let raw = "Photosynthesis\n\n  converts light.\nPage 3 of 10\n12\n© 2024 Biology Press\nCONFIDENTIAL copy\nChlorophyll absorbs 680 nm light.";
        assert_eq!(
            clean_text(raw),
            "Photosynthesis converts light. Chlorophyll absorbs 680 nm light."
        );
    }

    #[test]
    fn clean_text_keeps_inline_numbers() {
        assert_eq!(clean_text("About 12 500 species"), "About 12 500 species");
    }

    #[test]
    fn missing_file_is_reported() {
        let err = resolve_local("/definitely/not/a/real/file.pdf").unwrap_err();
        assert!(matches!(err, Pdf2GraphError::FileNotFound { .. }));
    }

    #[test]
    fn non_pdf_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, b"hello world").unwrap();
        let err = resolve_local(path.to_str().unwrap()).unwrap_err();
        match err {
            Pdf2GraphError::NotAPdf { magic, .. } => assert_eq!(&magic, b"hell"),
            other => panic!("expected NotAPdf, got {other:?}"),
        }
    }

    #[test]
    fn local_pdf_title_is_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cell biology.pdf");
        std::fs::write(&path, b"%PDF-1.4\n").unwrap();
        let resolved = resolve_local(path.to_str().unwrap()).unwrap();
        assert_eq!(resolved.title(), "cell biology");
    }

    #[tokio::test]
    async fn garbage_pdf_fails_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4\nthis is not really a pdf").unwrap();
        let err = extract_text(&path).await.unwrap_err();
        assert!(matches!(err, Pdf2GraphError::TextExtractionFailed { .. }));
    }
}
