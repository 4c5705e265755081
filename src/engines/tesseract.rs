//! Tesseract command-line engine
//!
//! Runs `<binary> <image> <output base> -l <language>` and reads the text the
//! engine writes to `<output base>.txt`. Every argument is passed to the child
//! process directly, never through a shell.

use crate::engine::OcrEngine;
use crate::error::ConvertError;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

/// OCR engine wrapping the `tesseract` CLI tool
pub struct TesseractCli {
    binary: String,
    timeout: Duration,
}

impl TesseractCli {
    pub fn new(binary: &str, timeout: Duration) -> Self {
        Self {
            binary: binary.to_string(),
            timeout,
        }
    }

    /// Resolve the configured binary to an executable path
    fn locate(&self) -> Option<PathBuf> {
        let candidate = Path::new(&self.binary);
        if candidate.components().count() > 1 {
            return is_executable(candidate).then(|| candidate.to_path_buf());
        }

        let search_path = std::env::var_os("PATH").unwrap_or_else(OsString::new);
        std::env::split_paths(&search_path)
            .map(|dir| dir.join(&self.binary))
            .find(|path| is_executable(path))
    }

    fn unavailable(&self) -> ConvertError {
        ConvertError::OcrUnavailable(self.binary.clone())
    }

    async fn run(
        &self,
        program: &Path,
        image: &Path,
        output_base: &Path,
        language: &str,
    ) -> Result<Output, ConvertError> {
        let mut command = Command::new(program);
        command
            .arg(image)
            .arg(output_base)
            .arg("-l")
            .arg(language)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => Err(self.unavailable()),
            Ok(Err(e)) => {
                tracing::error!("Failed to start {}: {}", self.binary, e);
                Err(ConvertError::OcrExecution {
                    message: "could not start the OCR engine".to_string(),
                    diagnostics: String::new(),
                })
            }
            Err(_) => Err(ConvertError::OcrExecution {
                message: format!("engine timed out after {}s", self.timeout.as_secs_f32()),
                diagnostics: String::new(),
            }),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractCli {
    fn name(&self) -> &str {
        &self.binary
    }

    fn description(&self) -> &'static str {
        "Tesseract OCR command-line engine"
    }

    fn is_available(&self) -> bool {
        self.locate().is_some()
    }

    #[tracing::instrument(level = "debug", skip(self), fields(engine = %self.binary))]
    async fn extract_text(&self, image: &Path, language: &str) -> Result<String, ConvertError> {
        let program = self.locate().ok_or_else(|| self.unavailable())?;

        // A fresh directory per call, so a failed run can never be mistaken
        // for the output of an earlier one.
        let scratch = tempfile::Builder::new()
            .prefix("ocr_output_")
            .tempdir()
            .map_err(|e| {
                tracing::error!("Failed to create OCR scratch directory: {}", e);
                ConvertError::OcrExecution {
                    message: "could not prepare engine output location".to_string(),
                    diagnostics: String::new(),
                }
            })?;
        let output_base = scratch.path().join("output");
        let artifact = output_base.with_extension("txt");

        let output = self.run(&program, image, &output_base, language).await?;
        let diagnostics = collect_diagnostics(&output);
        tracing::debug!(output = %diagnostics, "Output from OCR engine");

        if !output.status.success() {
            let message = match output.status.code() {
                Some(code) => format!("engine exited with status {}", code),
                None => "engine was terminated by a signal".to_string(),
            };
            return Err(ConvertError::OcrExecution {
                message,
                diagnostics,
            });
        }

        if !artifact.is_file() {
            return Err(ConvertError::OcrExecution {
                message: "output file not created".to_string(),
                diagnostics,
            });
        }

        let bytes = tokio::fs::read(&artifact).await.map_err(|e| {
            tracing::error!("Failed to read OCR output: {}", e);
            ConvertError::OcrExecution {
                message: "could not read OCR output".to_string(),
                diagnostics: diagnostics.clone(),
            }
        })?;

        if let Err(e) = scratch.close() {
            tracing::warn!("Failed to remove OCR scratch directory: {}", e);
        }

        Ok(String::from_utf8_lossy(&bytes).trim().to_string())
    }
}

fn collect_diagnostics(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    [stdout.trim(), stderr.trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// `sh` stands in for the engine: the "image" is a script that receives
    /// the output base as `$1` and the language as `$3`.
    fn scripted(dir: &Path, script: &str) -> PathBuf {
        let path = dir.join("engine.sh");
        std::fs::write(&path, script).unwrap();
        path
    }

    fn sh_engine() -> TesseractCli {
        TesseractCli::new("sh", Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_reads_and_trims_output() {
        let dir = tempfile::tempdir().unwrap();
        let image = scripted(dir.path(), "printf '  Hello World\\n12345  \\n\\n' > \"$1.txt\"\n");

        let text = sh_engine().extract_text(&image, "eng").await.unwrap();
        assert_eq!(text, "Hello World\n12345");
    }

    #[tokio::test]
    async fn test_language_is_passed_as_a_single_argument() {
        let dir = tempfile::tempdir().unwrap();
        let image = scripted(dir.path(), "printf '%s|%s' \"$2\" \"$3\" > \"$1.txt\"\n");
        let hostile = "eng; touch pwned $(touch pwned2)";

        let text = sh_engine().extract_text(&image, hostile).await.unwrap();
        assert_eq!(text, format!("-l|{}", hostile));
        assert!(!Path::new("pwned").exists());
        assert!(!Path::new("pwned2").exists());
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails_even_with_output() {
        let dir = tempfile::tempdir().unwrap();
        let image = scripted(dir.path(), "echo stale > \"$1.txt\"\necho 'bad image' >&2\nexit 3\n");

        let err = sh_engine().extract_text(&image, "eng").await.unwrap_err();
        match err {
            ConvertError::OcrExecution { message, diagnostics } => {
                assert_eq!(message, "engine exited with status 3");
                assert!(diagnostics.contains("bad image"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_output_includes_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let image = scripted(dir.path(), "echo 'Error opening data file' >&2\nexit 0\n");

        let err = sh_engine().extract_text(&image, "eng").await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("output file not created"));
        assert!(text.contains("Error opening data file"));
    }

    #[tokio::test]
    async fn test_output_location_is_unique_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("bases");
        let script = format!(
            "echo \"$1\" >> '{}'\necho ok > \"$1.txt\"\n",
            record.display()
        );
        let image = scripted(dir.path(), &script);

        let engine = sh_engine();
        engine.extract_text(&image, "eng").await.unwrap();
        engine.extract_text(&image, "eng").await.unwrap();

        let recorded = std::fs::read_to_string(&record).unwrap();
        let bases: Vec<&str> = recorded.lines().collect();
        assert_eq!(bases.len(), 2);
        assert_ne!(bases[0], bases[1]);
        for base in bases {
            assert!(!Path::new(&format!("{}.txt", base)).exists());
        }
    }

    #[tokio::test]
    async fn test_timeout_is_an_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let image = scripted(dir.path(), "sleep 5\n");
        let engine = TesseractCli::new("sh", Duration::from_millis(200));

        let err = engine.extract_text(&image, "eng").await.unwrap_err();
        assert!(matches!(err, ConvertError::OcrExecution { .. }));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let image = scripted(dir.path(), "");

        for binary in ["definitely-not-an-ocr-engine", "/nonexistent/dir/tesseract"] {
            let engine = TesseractCli::new(binary, Duration::from_secs(1));
            assert!(!engine.is_available());
            let err = engine.extract_text(&image, "eng").await.unwrap_err();
            assert!(matches!(err, ConvertError::OcrUnavailable(_)));
        }
    }
}
