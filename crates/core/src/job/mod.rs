//! Job records, the status state machine and durable job storage.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteJobStore;
pub use store::{JobError, JobStore, NewJob, SweptJob, TransitionPayload};
pub use types::{ConversionOptions, ErrorCategory, ErrorDetail, JobRecord, JobStatus};
