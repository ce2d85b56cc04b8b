//! HTTP application wiring (Axum router + dispatcher wiring).
//!
//! Folder structure:
//! - `routes.rs`: HTTP routes + handlers
//! - `dto.rs`: request DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::Extension;
use axum::Router;

use billflow_engine::{BillDispatcher, InMemoryEventStore};

pub mod dto;
pub mod errors;
pub mod routes;

/// The one dispatcher shape this process runs.
pub type SharedDispatcher = Arc<BillDispatcher<Arc<InMemoryEventStore>>>;

/// Build the full HTTP router around an already-wired dispatcher.
pub fn build_app(dispatcher: SharedDispatcher) -> Router {
    routes::router().layer(Extension(dispatcher))
}
