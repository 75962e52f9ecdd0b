//! File conversion via external tools.
//!
//! Each converter wraps one tool family behind the [`FileConverter`]
//! trait; the [`ConverterSet`] routes a job to the converter for its
//! source format's kind.
//!
//! # Example
//!
//! ```ignore
//! use convertifile_core::converter::{ConverterConfig, ConverterSet, ConversionRequest};
//!
//! let set = ConverterSet::standard(ConverterConfig::default());
//!
//! // Validate the tools are installed
//! set.validate_all().await?;
//!
//! let converter = set.for_kind(FormatKind::Audio).unwrap();
//! let output = converter.convert(&request).await?;
//! ```

mod config;
mod error;
mod ffmpeg;
mod libreoffice;
mod traits;

use std::collections::HashMap;
use std::sync::Arc;

pub use config::ConverterConfig;
pub use error::{classify_tool_failure, ConverterError};
pub use ffmpeg::FfmpegConverter;
pub use libreoffice::LibreOfficeConverter;
pub use traits::{ConversionRequest, FileConverter};

use crate::registry::FormatKind;

/// Routes conversion requests to the converter handling the source
/// format's kind.
pub struct ConverterSet {
    by_kind: HashMap<FormatKind, Arc<dyn FileConverter>>,
}

impl ConverterSet {
    /// Builds an empty set; converters are added with [`ConverterSet::register`].
    pub fn new() -> Self {
        Self {
            by_kind: HashMap::new(),
        }
    }

    /// The standard tool lineup: ffmpeg for media and images,
    /// LibreOffice/poppler for documents.
    pub fn standard(config: ConverterConfig) -> Self {
        let mut set = Self::new();
        set.register(Arc::new(FfmpegConverter::new(config.clone())));
        set.register(Arc::new(LibreOfficeConverter::new(config)));
        set
    }

    /// Registers a converter for every kind it declares.
    pub fn register(&mut self, converter: Arc<dyn FileConverter>) {
        for kind in converter.kinds() {
            self.by_kind.insert(*kind, Arc::clone(&converter));
        }
    }

    /// The converter for a format kind, if one is registered.
    pub fn for_kind(&self, kind: FormatKind) -> Option<Arc<dyn FileConverter>> {
        self.by_kind.get(&kind).cloned()
    }

    /// Validates every registered converter's tooling. Run at startup so
    /// a missing binary fails the boot instead of the first job.
    pub async fn validate_all(&self) -> Result<(), ConverterError> {
        let mut seen = Vec::new();
        for converter in self.by_kind.values() {
            if seen.contains(&converter.name()) {
                continue;
            }
            seen.push(converter.name());
            converter.validate().await?;
        }
        Ok(())
    }
}

impl Default for ConverterSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_set_covers_all_kinds() {
        let set = ConverterSet::standard(ConverterConfig::default());
        for kind in [
            FormatKind::Image,
            FormatKind::Audio,
            FormatKind::Video,
            FormatKind::Document,
        ] {
            assert!(set.for_kind(kind).is_some(), "no converter for {:?}", kind);
        }
    }

    #[test]
    fn test_routing_by_kind() {
        let set = ConverterSet::standard(ConverterConfig::default());
        assert_eq!(set.for_kind(FormatKind::Audio).unwrap().name(), "ffmpeg");
        assert_eq!(
            set.for_kind(FormatKind::Document).unwrap().name(),
            "libreoffice"
        );
    }

    #[test]
    fn test_empty_set() {
        let set = ConverterSet::new();
        assert!(set.for_kind(FormatKind::Image).is_none());
    }
}
