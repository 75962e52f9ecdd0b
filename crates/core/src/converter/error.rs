//! Error types for the converter module.

use std::path::PathBuf;
use thiserror::Error;

use crate::job::ErrorCategory;

/// Errors that can occur during conversion.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// External tool binary not found.
    #[error("{tool} not found at path: {path}")]
    ToolNotFound { tool: String, path: PathBuf },

    /// Input file not found.
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// The input file could not be decoded by the tool.
    #[error("Input file is corrupt or unreadable: {reason}")]
    InputCorrupt { reason: String },

    /// The tool rejected the requested codec or target.
    #[error("Unsupported codec or target: {reason}")]
    UnsupportedCodec { reason: String },

    /// The tool exited non-zero for a reason other than bad input.
    #[error("{tool} failed with code {code:?}: {reason}")]
    ToolFailed {
        tool: String,
        code: Option<i32>,
        reason: String,
    },

    /// Conversion exceeded its time budget.
    #[error("Conversion timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The tool exited zero but produced no output file.
    #[error("Output file not created: {path}")]
    OutputMissing { path: PathBuf },

    /// Scratch directory could not be created.
    #[error("Failed to create scratch directory: {path}")]
    ScratchDirFailed { path: PathBuf },

    /// I/O error during conversion.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConverterError {
    /// Maps the error onto the category recorded on the failed job.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InputCorrupt { .. } => ErrorCategory::InputCorrupt,
            Self::UnsupportedCodec { .. } => ErrorCategory::UnsupportedCodec,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            _ => ErrorCategory::ToolCrash,
        }
    }
}

/// Classifies a non-zero tool exit from its stderr output.
///
/// The tools do not distinguish bad input from their own failures in exit
/// codes, so this keys off the messages ffmpeg and poppler actually print.
pub fn classify_tool_failure(tool: &str, code: Option<i32>, stderr: &str) -> ConverterError {
    let lowered = stderr.to_lowercase();
    if lowered.contains("invalid data found when processing input")
        || lowered.contains("moov atom not found")
        || lowered.contains("may be a damaged file")
        || lowered.contains("syntax error")
        || lowered.contains("couldn't read xref table")
    {
        return ConverterError::InputCorrupt {
            reason: first_line(stderr),
        };
    }
    if lowered.contains("unknown encoder")
        || lowered.contains("encoder not found")
        || lowered.contains("codec not currently supported in container")
    {
        return ConverterError::UnsupportedCodec {
            reason: first_line(stderr),
        };
    }
    ConverterError::ToolFailed {
        tool: tool.to_string(),
        code,
        reason: first_line(stderr),
    }
}

fn first_line(stderr: &str) -> String {
    // Stderr can be pages long; keep the most relevant tail line.
    stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("no output")
        .trim()
        .to_string()
}
