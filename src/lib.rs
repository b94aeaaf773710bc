//! # vSphere Secrets
//!
//! A secrets backend that issues short-lived vSphere credentials.
//!
//! Administrators store one vSphere connection configuration and any number of
//! roles. Reading a role yields a credential: a logged-in session for a
//! static role, or a freshly created principal with a delegated token for a
//! dynamic role. Every credential carries a lease that can be renewed or
//! revoked.
//!
//! ## Architecture
//!
//! ```text
//! HTTP API (axum) → Backend → IssuanceEngine → SessionProvider → vSphere
//!                      ↓            ↓
//!                  RoleStore   ClientCache / IdentityLockTable
//!                      ↓
//!                   Storage (in-memory or PostgreSQL)
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vsphere_secrets::{
//!     backend::Backend, domain::LeaseDefaults, provider::RestProviderFactory,
//!     storage::InMemoryStorage,
//! };
//!
//! # async fn run() -> vsphere_secrets::Result<()> {
//! let backend = Backend::new(
//!     Arc::new(InMemoryStorage::new()),
//!     Arc::new(RestProviderFactory::default()),
//!     LeaseDefaults::default(),
//! );
//! let secret = backend.issue("web").await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod backend;
pub mod config;
pub mod domain;
pub mod errors;
pub mod observability;
pub mod provider;
pub mod settings;
pub mod storage;

pub use config::AppConfig;
pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
