use std::path::Path;
use std::sync::Arc;

use convertifile_core::{Config, Dispatcher, JobStore, ResultStore};

/// Shared application state
pub struct AppState {
    config: Config,
    job_store: Arc<dyn JobStore>,
    result_store: Arc<dyn ResultStore>,
    dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(
        config: Config,
        job_store: Arc<dyn JobStore>,
        result_store: Arc<dyn ResultStore>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            config,
            job_store,
            result_store,
            dispatcher,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn job_store(&self) -> &dyn JobStore {
        self.job_store.as_ref()
    }

    pub fn result_store(&self) -> &dyn ResultStore {
        self.result_store.as_ref()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        self.dispatcher.as_ref()
    }

    /// Directory uploads are spooled to before conversion.
    pub fn intake_dir(&self) -> &Path {
        &self.config.storage.intake_dir
    }
}
