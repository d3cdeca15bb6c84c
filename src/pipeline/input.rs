//! Input resolution: normalise a user-supplied path or URL to a local PDF.
//!
//! pdfium needs a file-system path, so URLs are downloaded into a `TempDir`
//! and slide decks or word-processor files are converted to PDF with
//! LibreOffice (`soffice --headless --convert-to pdf`) into another one.
//! The temp directories live inside [`ResolvedInput`] and are removed when it
//! is dropped. PDF magic bytes (`%PDF`) are checked before returning so
//! callers get a meaningful error rather than a pdfium crash.

use crate::error::InsightsError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

/// Extensions LibreOffice converts to PDF for us.
pub const CONVERTIBLE_EXTENSIONS: &[&str] = &["ppt", "pptx", "odp", "doc", "docx", "odt"];

/// Upper bound for one LibreOffice conversion.
const CONVERSION_TIMEOUT_SECS: u64 = 120;

/// A local PDF ready for extraction.
#[derive(Debug)]
pub struct ResolvedInput {
    path: PathBuf,
    file_name: String,
    source: String,
    _temp_dirs: Vec<TempDir>,
}

impl ResolvedInput {
    /// Path to the PDF file, whichever way it was obtained.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name of the document the user asked for (before conversion).
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// The path or URL as supplied.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// File stem used to name the output files.
    pub fn stem(&self) -> &str {
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Resolve the input string to a local PDF file path.
///
/// URLs are downloaded first; convertible office formats are then turned
/// into PDF. Anything else must carry the PDF magic bytes.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, InsightsError> {
    let mut temp_dirs = Vec::new();
    let (path, file_name) = if is_url(input) {
        let (dir, path) = download_url(input, timeout_secs).await?;
        temp_dirs.push(dir);
        let name = file_name_of(&path);
        (path, name)
    } else {
        let path = resolve_local(input)?;
        let name = file_name_of(&path);
        (path, name)
    };

    let path = match extension_of(&path) {
        Some(ext) if CONVERTIBLE_EXTENSIONS.contains(&ext.as_str()) => {
            let (dir, pdf) = convert_to_pdf(&path).await?;
            temp_dirs.push(dir);
            pdf
        }
        Some(ext) if ext != "pdf" => {
            check_magic(&path).map_err(|e| match e {
                InsightsError::NotAPdf { path, .. } => InsightsError::UnsupportedFormat {
                    path,
                    extension: ext.clone(),
                },
                other => other,
            })?;
            path
        }
        _ => {
            check_magic(&path)?;
            path
        }
    };

    debug!("Resolved input {} → {}", input, path.display());
    Ok(ResolvedInput {
        path,
        file_name,
        source: input.to_string(),
        _temp_dirs: temp_dirs,
    })
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document.pdf")
        .to_string()
}

/// Validate that a local file exists and is readable.
fn resolve_local(path_str: &str) -> Result<PathBuf, InsightsError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(InsightsError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(_) => Ok(path),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(InsightsError::PermissionDenied { path })
        }
        Err(_) => Err(InsightsError::FileNotFound { path }),
    }
}

/// Verify the `%PDF` magic bytes.
fn check_magic(path: &Path) -> Result<(), InsightsError> {
    use std::io::Read;

    let mut f = std::fs::File::open(path).map_err(|_| InsightsError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    let mut magic = [0u8; 4];
    if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
        return Err(InsightsError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

/// Convert a slide deck or document to PDF with headless LibreOffice.
async fn convert_to_pdf(path: &Path) -> Result<(TempDir, PathBuf), InsightsError> {
    info!("Converting {} to PDF with LibreOffice", path.display());

    let out_dir = TempDir::new().map_err(|e| InsightsError::Internal(e.to_string()))?;
    let conversion_failed = |detail: String| InsightsError::ConversionFailed {
        path: path.to_path_buf(),
        detail,
    };

    let mut cmd = Command::new("soffice");
    cmd.arg("--headless")
        .arg("--convert-to")
        .arg("pdf")
        .arg("--outdir")
        .arg(out_dir.path())
        .arg(path)
        .kill_on_drop(true);

    let output = tokio::time::timeout(Duration::from_secs(CONVERSION_TIMEOUT_SECS), cmd.output())
        .await
        .map_err(|_| conversion_failed(format!("timed out after {CONVERSION_TIMEOUT_SECS}s")))?
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                conversion_failed("'soffice' not found on PATH".into())
            } else {
                conversion_failed(e.to_string())
            }
        })?;

    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(conversion_failed(format!("exit code {code}: {stderr}")));
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    let pdf = out_dir.path().join(format!("{stem}.pdf"));
    if !pdf.exists() {
        return Err(conversion_failed("LibreOffice produced no PDF".into()));
    }
    check_magic(&pdf)?;

    info!("Converted to: {}", pdf.display());
    Ok((out_dir, pdf))
}

/// Download a URL to a temporary directory and return the path.
async fn download_url(url: &str, timeout_secs: u64) -> Result<(TempDir, PathBuf), InsightsError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| InsightsError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            InsightsError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            InsightsError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(InsightsError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = filename_from_url(url);
    let temp_dir = TempDir::new().map_err(|e| InsightsError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| InsightsError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| InsightsError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());
    Ok((temp_dir, file_path))
}

/// Last path segment of the URL when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url_path() {
        assert_eq!(
            filename_from_url("https://example.com/studies/q3.pptx?x=1"),
            "q3.pptx"
        );
        assert_eq!(filename_from_url("https://example.com/download"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, InsightsError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn non_pdf_bytes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        std::fs::write(&path, b"PK\x03\x04zip").unwrap();
        let err = resolve_input(path.to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, InsightsError::NotAPdf { .. }));
    }

    #[tokio::test]
    async fn unknown_extension_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello world").unwrap();
        let err = resolve_input(path.to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, InsightsError::UnsupportedFormat { .. }), "{err}");
    }

    #[tokio::test]
    async fn local_pdf_resolves_with_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("study_2024.pdf");
        std::fs::write(&path, b"%PDF-1.7\n").unwrap();
        let resolved = resolve_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(resolved.file_name(), "study_2024.pdf");
        assert_eq!(resolved.stem(), "study_2024");
        assert_eq!(resolved.path(), path.as_path());
    }
}
