//! Crema Proxy - runs the offline worker in front of the portal origin.
//!
//! Incoming requests become fetch events for the active worker; the routes
//! under `/__worker` deliver push, notification click and sync events and
//! expose worker status.

pub mod handler;
pub mod server;

pub use handler::SOURCE_HEADER;
pub use server::{build_router, start_server, AppState};
