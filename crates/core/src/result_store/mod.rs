//! Storage for converted output artifacts with a retention policy.

mod fs_store;
mod store;

pub use fs_store::FsResultStore;
pub use store::{ResultRef, ResultStore, ResultStoreError};
