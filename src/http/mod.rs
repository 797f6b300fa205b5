//! HTTP server module
//!
//! This module handles HTTP request routing and handling:
//! - Axum router with the session and file endpoints
//! - Session handlers (process, seek, status)
//! - Manifest and segment serving from the segment store
//! - JSON error bodies, request metrics and CORS

pub mod files;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod session;

pub use routes::create_router;
