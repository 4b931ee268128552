//! Web API module.
//!
//! HTTP surface over the file service: upload, list, lookup, update, delete,
//! download and audit.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use router::{create_health_router, create_router, create_swagger_router};
pub use server::WebServer;
