//! Mock converter for testing.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::converter::{ConversionRequest, ConverterError, FileConverter};
use crate::registry::FormatKind;

/// A recorded conversion request for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedConversion {
    /// The request that was submitted.
    pub request: ConversionRequest,
    /// Whether the conversion succeeded.
    pub success: bool,
}

/// Mock implementation of the [`FileConverter`] trait.
///
/// Provides controllable behavior for testing:
/// - Track conversion requests for assertions
/// - Simulate success/failure per call
/// - Simulate slow conversions
///
/// On success it writes a small output file into `scratch_dir` named
/// `{job_id}.{target_format}`, the same contract the real converters
/// honor.
///
/// # Example
///
/// ```rust,ignore
/// use convertifile_core::testing::MockConverter;
///
/// let converter = MockConverter::new(scratch_dir);
/// converter.fail_next(ConverterError::Timeout { timeout_secs: 60 }).await;
///
/// let result = converter.convert(&request).await;
/// assert!(result.is_err());
/// assert_eq!(converter.recorded_conversions().await.len(), 1);
/// ```
pub struct MockConverter {
    scratch_dir: PathBuf,
    /// Recorded conversions.
    conversions: Arc<RwLock<Vec<RecordedConversion>>>,
    /// If set, the next conversion fails with this error.
    next_error: Arc<RwLock<Option<ConverterError>>>,
    /// Simulated conversion duration in milliseconds.
    conversion_duration_ms: Arc<RwLock<u64>>,
    /// Bytes written to the output file on success.
    output_bytes: Arc<RwLock<Vec<u8>>>,
}

impl MockConverter {
    /// Create a new mock converter writing outputs under `scratch_dir`.
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            conversions: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            conversion_duration_ms: Arc::new(RwLock::new(0)),
            output_bytes: Arc::new(RwLock::new(b"converted".to_vec())),
        }
    }

    /// Make the next conversion fail with the given error.
    pub async fn fail_next(&self, error: ConverterError) {
        *self.next_error.write().await = Some(error);
    }

    /// Simulate conversions taking this long.
    pub async fn set_conversion_duration(&self, duration: Duration) {
        *self.conversion_duration_ms.write().await = duration.as_millis() as u64;
    }

    /// Set the bytes written on success.
    pub async fn set_output_bytes(&self, bytes: Vec<u8>) {
        *self.output_bytes.write().await = bytes;
    }

    /// All conversions seen so far.
    pub async fn recorded_conversions(&self) -> Vec<RecordedConversion> {
        self.conversions.read().await.clone()
    }
}

#[async_trait]
impl FileConverter for MockConverter {
    fn name(&self) -> &str {
        "mock"
    }

    fn kinds(&self) -> &[FormatKind] {
        &[
            FormatKind::Image,
            FormatKind::Audio,
            FormatKind::Video,
            FormatKind::Document,
        ]
    }

    async fn convert(&self, request: &ConversionRequest) -> Result<PathBuf, ConverterError> {
        let delay = *self.conversion_duration_ms.read().await;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if let Some(error) = self.next_error.write().await.take() {
            self.conversions.write().await.push(RecordedConversion {
                request: request.clone(),
                success: false,
            });
            return Err(error);
        }

        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        let output_path = self
            .scratch_dir
            .join(format!("{}.{}", request.job_id, request.target_format));
        tokio::fs::write(&output_path, self.output_bytes.read().await.as_slice()).await?;

        self.conversions.write().await.push(RecordedConversion {
            request: request.clone(),
            success: true,
        });
        Ok(output_path)
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        Ok(())
    }
}
