//! HTTP server for the file conversion service.
//!
//! Exposes the submission, status and download endpoints over the core
//! pipeline. The binary in `main.rs` wires the production backends; tests
//! build the same router against mocks.

pub mod api;
pub mod metrics;
pub mod state;

pub use api::create_router;
pub use state::AppState;
