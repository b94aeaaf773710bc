//! vSphere Automation REST session provider.
//!
//! Supports the session lifecycle only: `POST /api/session` (basic auth)
//! opens a session, `DELETE /api/session` with the `vmware-api-session-id`
//! header closes it. Principal management and token minting have no stable
//! REST surface and report [`ProviderError::Unsupported`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use super::{ProviderError, ProviderFactory, ProviderResult, SessionProvider, TokenRequest};
use crate::domain::{SecretString, SessionHandle};
use crate::settings::ConnectionSettings;

const SESSION_PATH: &str = "/api/session";
const SESSION_HEADER: &str = "vmware-api-session-id";

/// Builds [`RestSessionProvider`]s, verifying the mount credentials on connect.
#[derive(Debug, Clone)]
pub struct RestProviderFactory {
    timeout: Duration,
}

impl RestProviderFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for RestProviderFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl ProviderFactory for RestProviderFactory {
    async fn connect(&self, settings: &ConnectionSettings) -> ProviderResult<Arc<dyn SessionProvider>> {
        let client = Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(settings.insecure_tls)
            .build()
            .map_err(|e| ProviderError::backend(format!("Failed to build HTTP client: {}", e)))?;

        let provider = RestSessionProvider::new(client, settings.endpoint.clone(), settings.insecure_tls);

        if !settings.username.is_empty() {
            let session = provider.login(&settings.username, &settings.password).await?;
            if let Err(e) = provider.logout(&session).await {
                warn!(error = %e, "failed to close credential check session");
            }
        }

        Ok(Arc::new(provider))
    }
}

/// Session provider speaking the vSphere Automation REST API.
#[derive(Debug, Clone)]
pub struct RestSessionProvider {
    client: Client,
    endpoint: Url,
    insecure: bool,
}

impl RestSessionProvider {
    pub fn new(client: Client, endpoint: Url, insecure: bool) -> Self {
        Self { client, endpoint, insecure }
    }

    fn session_url(base: &Url) -> ProviderResult<Url> {
        base.join(SESSION_PATH)
            .map_err(|e| ProviderError::backend(format!("invalid endpoint '{}': {}", base, e)))
    }
}

fn same_endpoint(candidate: &str, configured: &Url) -> bool {
    Url::parse(candidate).is_ok_and(|url| url.origin() == configured.origin())
}

fn request_error(error: reqwest::Error) -> ProviderError {
    ProviderError::connection_failed(error.to_string())
}

#[async_trait]
impl SessionProvider for RestSessionProvider {
    async fn login(&self, username: &str, password: &SecretString) -> ProviderResult<SessionHandle> {
        debug!(endpoint = %self.endpoint, username, "POST {}", SESSION_PATH);

        let response = self
            .client
            .post(Self::session_url(&self.endpoint)?)
            .basic_auth(username, Some(password.expose_secret()))
            .send()
            .await
            .map_err(request_error)?;

        match response.status() {
            status if status.is_success() => {
                let session_id: String = response.json().await.map_err(|e| {
                    ProviderError::backend(format!("invalid session response: {}", e))
                })?;
                Ok(SessionHandle {
                    endpoint: self.endpoint.to_string(),
                    username: username.to_string(),
                    session_id: SecretString::new(session_id),
                    insecure: self.insecure,
                })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
                ProviderError::authentication_failed(format!("login rejected for '{}'", username)),
            ),
            status => Err(ProviderError::backend(format!(
                "unexpected status {} from POST {}",
                status, SESSION_PATH
            ))),
        }
    }

    async fn logout(&self, session: &SessionHandle) -> ProviderResult<()> {
        // Handles arrive from callers; only the configured endpoint is ever contacted.
        if !same_endpoint(&session.endpoint, &self.endpoint) {
            return Err(ProviderError::backend("session belongs to a different endpoint"));
        }
        debug!(endpoint = %self.endpoint, username = %session.username, "DELETE {}", SESSION_PATH);

        let response = self
            .client
            .delete(Self::session_url(&self.endpoint)?)
            .header(SESSION_HEADER, session.session_id.expose_secret())
            .send()
            .await
            .map_err(request_error)?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND => Err(ProviderError::SessionNotFound),
            status => Err(ProviderError::backend(format!(
                "unexpected status {} from DELETE {}",
                status, SESSION_PATH
            ))),
        }
    }

    async fn issue_token(&self, _request: TokenRequest<'_>) -> ProviderResult<SecretString> {
        Err(ProviderError::unsupported("issue_token"))
    }

    async fn role_exists(&self, _role: &str) -> ProviderResult<bool> {
        Err(ProviderError::unsupported("role_exists"))
    }

    async fn group_exists(&self, _group: &str) -> ProviderResult<bool> {
        Err(ProviderError::unsupported("group_exists"))
    }

    async fn user_exists(&self, _username: &str) -> ProviderResult<bool> {
        Err(ProviderError::unsupported("user_exists"))
    }

    async fn create_principal(&self, _username: &str, _password: &SecretString) -> ProviderResult<()> {
        Err(ProviderError::unsupported("create_principal"))
    }

    async fn assign_role(&self, _principal: &str, _role: &str) -> ProviderResult<String> {
        Err(ProviderError::unsupported("assign_role"))
    }

    async fn add_to_group(&self, _principal: &str, _group: &str) -> ProviderResult<String> {
        Err(ProviderError::unsupported("add_to_group"))
    }

    async fn unassign_role(&self, _assignment_id: &str) -> ProviderResult<()> {
        Err(ProviderError::unsupported("unassign_role"))
    }

    async fn remove_from_group(&self, _membership_id: &str) -> ProviderResult<()> {
        Err(ProviderError::unsupported("remove_from_group"))
    }

    async fn delete_principal(&self, _username: &str) -> ProviderResult<()> {
        Err(ProviderError::unsupported("delete_principal"))
    }
}
