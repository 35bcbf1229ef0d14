use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

#[async_trait]
pub trait Ocr: Send + Sync {
    async fn recognize_text(&self, image: &Path) -> Result<String>;
}

/// Runs one `tesseract` process per image and reads the text from stdout.
pub struct TesseractOcr {
    command: String,
    language: String,
}

impl TesseractOcr {
    pub fn new(command: &str, language: &str) -> Self {
        Self {
            command: command.to_string(),
            language: language.to_string(),
        }
    }
}

#[async_trait]
impl Ocr for TesseractOcr {
    async fn recognize_text(&self, image: &Path) -> Result<String> {
        if !image.is_file() {
            return Err(Error::invalid(format!(
                "Image not found: {}",
                image.display()
            )));
        }

        debug!(command = %self.command, image = %image.display(), "starting OCR");
        let output = Command::new(&self.command)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Ocr(format!("could not run {}: {}", self.command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Ocr(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(chars = text.chars().count(), "OCR finished");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_image_is_input_error() {
        let ocr = TesseractOcr::new("tesseract", "eng");
        let err = ocr
            .recognize_text(Path::new("/definitely/not/here.png"))
            .await
            .unwrap_err();
        assert!(err.is_input_validation());
    }

    #[tokio::test]
    async fn test_unknown_command_is_ocr_error() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("scan.png");
        std::fs::write(&image, b"png").unwrap();

        let ocr = TesseractOcr::new("glucocare-no-such-ocr-binary", "eng");
        let err = ocr.recognize_text(&image).await.unwrap_err();
        assert!(matches!(err, Error::Ocr(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_arguments_and_stdout_capture() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("scan.png");
        std::fs::write(&image, b"png").unwrap();

        // `echo` prints its arguments, which shows the exact invocation.
        let ocr = TesseractOcr::new("echo", "hin");
        let text = ocr.recognize_text(&image).await.unwrap();
        assert_eq!(text, format!("{} stdout -l hin", image.display()));
    }
}
