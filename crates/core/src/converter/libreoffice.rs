//! Document converter backed by LibreOffice and poppler.
//!
//! Document-to-document conversions go through `soffice --headless`.
//! Pdf-to-image conversions render the first page with `pdftoppm`; for
//! targets poppler cannot emit directly the page is rendered to png and
//! transcoded with ffmpeg.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::config::ConverterConfig;
use super::error::{classify_tool_failure, ConverterError};
use super::traits::{ConversionRequest, FileConverter};
use crate::registry::FormatKind;

/// LibreOffice/poppler-based document converter.
pub struct LibreOfficeConverter {
    config: ConverterConfig,
}

impl LibreOfficeConverter {
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    async fn run_tool(
        &self,
        tool: &str,
        binary: &Path,
        args: &[String],
    ) -> Result<(), ConverterError> {
        debug!("Running {}: {:?}", tool, args);
        let child = Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ConverterError::ToolNotFound {
                        tool: tool.to_string(),
                        path: binary.to_path_buf(),
                    }
                } else {
                    ConverterError::Io(e)
                }
            })?;

        let timeout_duration = Duration::from_secs(self.config.timeout_secs);
        let output = match timeout(timeout_duration, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ConverterError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_tool_failure(tool, output.status.code(), &stderr));
        }
        Ok(())
    }

    /// Renders the first pdf page to an image. Poppler emits png, jpeg
    /// and tiff natively; other raster targets go through an ffmpeg
    /// transcode of the png render.
    async fn pdf_to_image(&self, request: &ConversionRequest) -> Result<PathBuf, ConverterError> {
        let prefix = self.config.scratch_dir.join(&request.job_id);
        let final_path = self
            .config
            .scratch_dir
            .join(format!("{}.{}", request.job_id, request.target_format));

        let (flag, poppler_ext) = match request.target_format.as_str() {
            "png" => ("-png", "png"),
            "jpeg" => ("-jpeg", "jpg"),
            "tiff" => ("-tiff", "tif"),
            // webp, bmp: render png, transcode below
            _ => ("-png", "png"),
        };

        let args = vec![
            "-r".to_string(),
            self.config.pdf_dpi.to_string(),
            "-singlefile".to_string(),
            flag.to_string(),
            request.input_path.to_string_lossy().to_string(),
            prefix.to_string_lossy().to_string(),
        ];
        self.run_tool("pdftoppm", &self.config.pdftoppm_path, &args)
            .await?;

        let rendered = self
            .config
            .scratch_dir
            .join(format!("{}.{}", request.job_id, poppler_ext));
        if !rendered.exists() {
            return Err(ConverterError::OutputMissing { path: rendered });
        }

        let needs_transcode = !matches!(request.target_format.as_str(), "png" | "jpeg" | "tiff");
        if needs_transcode {
            let args = vec![
                "-y".to_string(),
                "-loglevel".to_string(),
                self.config.ffmpeg_log_level.clone(),
                "-i".to_string(),
                rendered.to_string_lossy().to_string(),
                final_path.to_string_lossy().to_string(),
            ];
            self.run_tool("ffmpeg", &self.config.ffmpeg_path, &args)
                .await?;
            if let Err(e) = tokio::fs::remove_file(&rendered).await {
                debug!("Could not remove intermediate render {:?}: {}", rendered, e);
            }
        } else if rendered != final_path {
            // Poppler's extension differs from the normalized one.
            tokio::fs::rename(&rendered, &final_path).await?;
        }

        if !final_path.exists() {
            return Err(ConverterError::OutputMissing { path: final_path });
        }
        Ok(final_path)
    }

    /// Converts between document formats via headless LibreOffice.
    async fn office_convert(&self, request: &ConversionRequest) -> Result<PathBuf, ConverterError> {
        let args = vec![
            "--headless".to_string(),
            "--convert-to".to_string(),
            request.target_format.clone(),
            "--outdir".to_string(),
            self.config.scratch_dir.to_string_lossy().to_string(),
            request.input_path.to_string_lossy().to_string(),
        ];
        self.run_tool("libreoffice", &self.config.libreoffice_path, &args)
            .await?;

        // soffice names the output after the input stem.
        let stem = request
            .input_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&request.job_id);
        let produced = self
            .config
            .scratch_dir
            .join(format!("{}.{}", stem, request.target_format));
        if !produced.exists() {
            return Err(ConverterError::OutputMissing { path: produced });
        }

        let final_path = self
            .config
            .scratch_dir
            .join(format!("{}.{}", request.job_id, request.target_format));
        if produced != final_path {
            tokio::fs::rename(&produced, &final_path).await?;
        }
        Ok(final_path)
    }
}

#[async_trait]
impl FileConverter for LibreOfficeConverter {
    fn name(&self) -> &str {
        "libreoffice"
    }

    fn kinds(&self) -> &[FormatKind] {
        &[FormatKind::Document]
    }

    async fn convert(&self, request: &ConversionRequest) -> Result<PathBuf, ConverterError> {
        if !request.input_path.exists() {
            return Err(ConverterError::InputNotFound {
                path: request.input_path.clone(),
            });
        }

        tokio::fs::create_dir_all(&self.config.scratch_dir)
            .await
            .map_err(|_| ConverterError::ScratchDirFailed {
                path: self.config.scratch_dir.clone(),
            })?;

        let target_is_image = crate::registry::kind_of(&request.target_format)
            == Some(FormatKind::Image);
        if request.source_format == "pdf" && target_is_image {
            self.pdf_to_image(request).await
        } else {
            self.office_convert(request).await
        }
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        for (tool, binary) in [
            ("libreoffice", &self.config.libreoffice_path),
            ("pdftoppm", &self.config.pdftoppm_path),
        ] {
            let result = Command::new(binary)
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;

            match result {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    return Err(ConverterError::ToolFailed {
                        tool: tool.to_string(),
                        code: status.code(),
                        reason: format!("{} --version failed", tool),
                    })
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(ConverterError::ToolNotFound {
                        tool: tool.to_string(),
                        path: binary.clone(),
                    })
                }
                Err(e) => return Err(ConverterError::Io(e)),
            }
        }

        tokio::fs::create_dir_all(&self.config.scratch_dir)
            .await
            .map_err(|_| ConverterError::ScratchDirFailed {
                path: self.config.scratch_dir.clone(),
            })?;
        Ok(())
    }
}
