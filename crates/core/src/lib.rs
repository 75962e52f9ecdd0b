pub mod config;
pub mod converter;
pub mod dispatch;
pub mod job;
pub mod metrics;
pub mod queue;
pub mod registry;
pub mod result_store;
pub mod retention;
pub mod testing;
pub mod worker;

pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use converter::{ConverterConfig, ConverterSet, FileConverter};
pub use dispatch::{DispatchError, Dispatcher};
pub use job::{
    ConversionOptions, ErrorCategory, ErrorDetail, JobError, JobRecord, JobStatus, JobStore,
    NewJob, SqliteJobStore,
};
pub use queue::{JobQueue, MemoryQueue, QueueError, WorkUnit};
pub use registry::FormatKind;
pub use result_store::{FsResultStore, ResultStore, ResultStoreError};
pub use retention::{RetentionConfig, RetentionSweeper};
pub use worker::WorkerPool;
