//! Configuration for the converter module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration shared by the external-tool converters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Path to soffice (LibreOffice) binary.
    #[serde(default = "default_libreoffice_path")]
    pub libreoffice_path: PathBuf,

    /// Path to pdftoppm binary (poppler).
    #[serde(default = "default_pdftoppm_path")]
    pub pdftoppm_path: PathBuf,

    /// Scratch directory for conversion outputs before they move into the
    /// result store.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Timeout for a single conversion in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Render resolution in DPI for pdf-to-image conversions.
    #[serde(default = "default_pdf_dpi")]
    pub pdf_dpi: u32,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[serde(default = "default_log_level")]
    pub ffmpeg_log_level: String,

    /// Additional global ffmpeg arguments.
    #[serde(default)]
    pub extra_ffmpeg_args: Vec<String>,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_libreoffice_path() -> PathBuf {
    PathBuf::from("soffice")
}

fn default_pdftoppm_path() -> PathBuf {
    PathBuf::from("pdftoppm")
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("convertifile-scratch")
}

fn default_timeout() -> u64 {
    600 // 10 minutes
}

fn default_pdf_dpi() -> u32 {
    150
}

fn default_log_level() -> String {
    "warning".to_string()
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            libreoffice_path: default_libreoffice_path(),
            pdftoppm_path: default_pdftoppm_path(),
            scratch_dir: default_scratch_dir(),
            timeout_secs: default_timeout(),
            pdf_dpi: default_pdf_dpi(),
            ffmpeg_log_level: default_log_level(),
            extra_ffmpeg_args: Vec::new(),
        }
    }
}

impl ConverterConfig {
    /// Sets the scratch directory.
    pub fn with_scratch_dir(mut self, scratch_dir: PathBuf) -> Self {
        self.scratch_dir = scratch_dir;
        self
    }

    /// Sets the timeout in seconds.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}
