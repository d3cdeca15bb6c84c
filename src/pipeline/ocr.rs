//! OCR engine seam used by the relevance filter and the composite detector.
//!
//! [`TesseractCli`] shells out to the `tesseract` binary, feeding it the
//! image's PNG bytes through a temp file and reading plain text from stdout.
//! Tests substitute a scripted engine.

use crate::document::ImageElement;
use crate::error::ItemError;
use std::io::Write;
use std::process::Command;
use tracing::debug;

/// Reads the text out of one image.
///
/// Implementations are called from the blocking pool, possibly for several
/// images at once.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &ImageElement) -> Result<String, ItemError>;

    fn engine_name(&self) -> &str;
}

/// `tesseract` command-line engine (`--oem 3 --psm 6`).
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: String,
    language: String,
}

impl TesseractCli {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            binary: "tesseract".to_string(),
            language: language.into(),
        }
    }

    /// Use a tesseract binary other than the one on `PATH`.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Check if the binary can be executed.
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

impl OcrEngine for TesseractCli {
    fn recognize(&self, image: &ImageElement) -> Result<String, ItemError> {
        let failed = |detail: String| ItemError::OcrFailed { detail };

        let mut tmpfile = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .map_err(|e| failed(e.to_string()))?;
        tmpfile
            .write_all(&image.data)
            .map_err(|e| failed(e.to_string()))?;

        let output = Command::new(&self.binary)
            .arg(tmpfile.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("--oem")
            .arg("3")
            .arg("--psm")
            .arg("6")
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    failed(format!("'{}' not found on PATH", self.binary))
                } else {
                    failed(format!("{} failed: {}", self.binary, e))
                }
            })?;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(failed(format!("exit code {code}: {stderr}")));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(image = %image.image_ref, chars = text.len(), "OCR complete");
        Ok(text)
    }

    fn engine_name(&self) -> &str {
        "tesseract"
    }
}
