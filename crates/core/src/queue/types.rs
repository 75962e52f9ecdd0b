//! Queue message types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::job::{ConversionOptions, JobRecord};

/// One unit of conversion work handed to the broker queue.
///
/// Serializable so broker-backed queue implementations can put it on the
/// wire. Delivery is at-least-once; consumers must tolerate duplicates
/// (the job store's claim transition is the guard).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub job_id: String,
    pub source_format: String,
    pub target_format: String,
    pub options: ConversionOptions,
    pub input_path: PathBuf,
}

impl From<&JobRecord> for WorkUnit {
    fn from(record: &JobRecord) -> Self {
        Self {
            job_id: record.id.clone(),
            source_format: record.source_format.clone(),
            target_format: record.target_format.clone(),
            options: record.options.clone(),
            input_path: record.input_path.clone(),
        }
    }
}
