//! Trait definitions for the converter module.

use async_trait::async_trait;
use std::path::PathBuf;

use super::error::ConverterError;
use crate::job::ConversionOptions;
use crate::registry::FormatKind;

/// One conversion to perform, as handed to a converter by a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub job_id: String,
    pub input_path: PathBuf,
    pub source_format: String,
    pub target_format: String,
    pub options: ConversionOptions,
}

/// A converter that turns an input file into an output file via an
/// external tool.
#[async_trait]
pub trait FileConverter: Send + Sync {
    /// Returns the name of this converter implementation.
    fn name(&self) -> &str;

    /// The format kinds this converter handles.
    fn kinds(&self) -> &[FormatKind];

    /// Performs the conversion and returns the path of the output file,
    /// which lives in the converter's scratch directory until the worker
    /// moves it into the result store.
    async fn convert(&self, request: &ConversionRequest) -> Result<PathBuf, ConverterError>;

    /// Validates that the converter's tools are installed and usable.
    async fn validate(&self) -> Result<(), ConverterError>;
}
