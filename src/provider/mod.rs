//! # Session Providers
//!
//! The capability the issuance core needs from vSphere. A [`ProviderFactory`]
//! turns resolved [`ConnectionSettings`] into a connected [`SessionProvider`];
//! the backend caches that provider and drives every remote call through it.
//!
//! ## Implementations
//!
//! - [`rest::RestSessionProvider`]: vSphere Automation REST API (`/api/session`)
//! - [`simulator::SimulatorProvider`]: in-memory vCenter for tests and local runs
//!
//! ## Deletion semantics
//!
//! Teardown methods (`unassign_role`, `remove_from_group`, `delete_principal`)
//! treat an already-absent object as success, so revocation can be retried.

pub mod error;
pub mod rest;
pub mod simulator;

pub use error::{ProviderError, ProviderResult};
pub use rest::{RestProviderFactory, RestSessionProvider};
pub use simulator::{SimulatedOperation, SimulatorFactory, SimulatorProvider};

pub use crate::domain::SessionHandle;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::SecretString;
use crate::settings::ConnectionSettings;

/// Parameters of a delegated token request.
#[derive(Debug, Clone)]
pub struct TokenRequest<'a> {
    pub username: &'a str,
    pub password: &'a SecretString,
    pub lifetime: Duration,
    pub renewable: bool,
    pub delegatable: bool,
}

/// Remote operations against one vSphere endpoint.
#[async_trait]
pub trait SessionProvider: Send + Sync + std::fmt::Debug {
    /// Open a session as `username`.
    async fn login(&self, username: &str, password: &SecretString) -> ProviderResult<SessionHandle>;

    /// Close a session. Returns [`ProviderError::SessionNotFound`] when it is already closed.
    async fn logout(&self, session: &SessionHandle) -> ProviderResult<()>;

    /// Mint a delegated token for an account.
    async fn issue_token(&self, request: TokenRequest<'_>) -> ProviderResult<SecretString>;

    async fn role_exists(&self, role: &str) -> ProviderResult<bool>;

    async fn group_exists(&self, group: &str) -> ProviderResult<bool>;

    async fn user_exists(&self, username: &str) -> ProviderResult<bool>;

    /// Create an ephemeral principal.
    async fn create_principal(&self, username: &str, password: &SecretString) -> ProviderResult<()>;

    /// Grant a role to a principal, returning the assignment id.
    async fn assign_role(&self, principal: &str, role: &str) -> ProviderResult<String>;

    /// Add a principal to a group, returning the membership id.
    async fn add_to_group(&self, principal: &str, group: &str) -> ProviderResult<String>;

    async fn unassign_role(&self, assignment_id: &str) -> ProviderResult<()>;

    async fn remove_from_group(&self, membership_id: &str) -> ProviderResult<()>;

    /// Delete a principal. Deleting an absent principal succeeds.
    async fn delete_principal(&self, username: &str) -> ProviderResult<()>;
}

/// Builds connected providers from resolved settings.
#[async_trait]
pub trait ProviderFactory: Send + Sync + std::fmt::Debug {
    /// Connect and authenticate with the settings' mount credentials.
    async fn connect(&self, settings: &ConnectionSettings) -> ProviderResult<Arc<dyn SessionProvider>>;
}
