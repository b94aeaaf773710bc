//! # HTTP API
//!
//! axum transport over the [`Backend`](crate::backend::Backend): config and
//! role administration, session issuance, and lease renew/revoke callbacks.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use routes::{build_router, ApiState};
pub use server::{start_api_server, start_api_server_with_shutdown};
