//! Testing utilities and mock implementations for E2E tests.
//!
//! This module provides mock implementations of the external-tool traits,
//! allowing full pipeline tests without ffmpeg or LibreOffice installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use convertifile_core::testing::MockConverter;
//!
//! let converter = MockConverter::new(scratch_dir);
//!
//! // Configure behavior
//! converter.fail_next(ConverterError::Timeout { timeout_secs: 60 }).await;
//!
//! // Use in a ConverterSet...
//! ```

mod mock_converter;

pub use mock_converter::{MockConverter, RecordedConversion};
