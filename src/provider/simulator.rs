//! In-memory vCenter simulator.
//!
//! Keeps accounts, roles, groups, sessions, role assignments and group
//! memberships in process. Counts factory connections and logins, tracks how
//! many logins run at once per account, and can inject failures per operation.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ProviderError, ProviderFactory, ProviderResult, SessionProvider, TokenRequest};
use crate::domain::{SecretString, SessionHandle};
use crate::settings::ConnectionSettings;

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimulatedOperation {
    Connect,
    Login,
    Logout,
    IssueToken,
    CreatePrincipal,
    AssignRole,
    AddToGroup,
    UnassignRole,
    RemoveFromGroup,
    DeletePrincipal,
}

#[derive(Debug, Default)]
struct SimulatorState {
    accounts: HashMap<String, String>,
    principals: HashSet<String>,
    roles: HashSet<String>,
    groups: HashSet<String>,
    /// session id -> username
    sessions: HashMap<String, String>,
    /// assignment id -> (principal, role)
    assignments: HashMap<String, (String, String)>,
    /// membership id -> (principal, group)
    memberships: HashMap<String, (String, String)>,
    tokens: HashMap<String, String>,
    failing: HashSet<SimulatedOperation>,
    logins_in_flight: HashMap<String, usize>,
}

impl SimulatorState {
    fn check(&self, operation: SimulatedOperation) -> ProviderResult<()> {
        if self.failing.contains(&operation) {
            Err(ProviderError::backend(format!("injected failure in {:?}", operation)))
        } else {
            Ok(())
        }
    }

    fn user_exists(&self, username: &str) -> bool {
        self.accounts.contains_key(username) || self.principals.contains(username)
    }
}

/// Simulated vSphere endpoint.
#[derive(Debug, Default)]
pub struct SimulatorProvider {
    state: Mutex<SimulatorState>,
    login_delay: Duration,
    logins: AtomicUsize,
    logouts: AtomicUsize,
    max_concurrent_logins: AtomicUsize,
    max_concurrent_same_account: AtomicUsize,
}

impl SimulatorProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, username: &str, password: &str) -> Self {
        self.state.get_mut().accounts.insert(username.to_string(), password.to_string());
        self
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.state.get_mut().roles.insert(role.to_string());
        self
    }

    pub fn with_group(mut self, group: &str) -> Self {
        self.state.get_mut().groups.insert(group.to_string());
        self
    }

    /// Hold every login open for `delay`, to observe overlap.
    pub fn with_login_delay(mut self, delay: Duration) -> Self {
        self.login_delay = delay;
        self
    }

    pub async fn fail(&self, operation: SimulatedOperation) {
        self.state.lock().await.failing.insert(operation);
    }

    pub async fn recover(&self, operation: SimulatedOperation) {
        self.state.lock().await.failing.remove(&operation);
    }

    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn logout_count(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }

    /// Most logins observed running at the same time, across all accounts.
    pub fn max_concurrent_logins(&self) -> usize {
        self.max_concurrent_logins.load(Ordering::SeqCst)
    }

    /// Most logins observed running at the same time for a single account.
    pub fn max_concurrent_same_account(&self) -> usize {
        self.max_concurrent_same_account.load(Ordering::SeqCst)
    }

    pub async fn active_sessions(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    pub async fn principals(&self) -> Vec<String> {
        let mut principals: Vec<String> = self.state.lock().await.principals.iter().cloned().collect();
        principals.sort();
        principals
    }

    pub async fn assignment_count(&self) -> usize {
        self.state.lock().await.assignments.len()
    }

    pub async fn membership_count(&self) -> usize {
        self.state.lock().await.memberships.len()
    }

    async fn begin_login(&self, username: &str) {
        let mut state = self.state.lock().await;
        let same_account = {
            let count = state.logins_in_flight.entry(username.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        let total: usize = state.logins_in_flight.values().sum();
        self.max_concurrent_same_account.fetch_max(same_account, Ordering::SeqCst);
        self.max_concurrent_logins.fetch_max(total, Ordering::SeqCst);
    }

    async fn end_login(&self, username: &str) {
        let mut state = self.state.lock().await;
        if let Some(count) = state.logins_in_flight.get_mut(username) {
            *count = count.saturating_sub(1);
        }
    }
}

#[async_trait]
impl SessionProvider for SimulatorProvider {
    async fn login(&self, username: &str, password: &SecretString) -> ProviderResult<SessionHandle> {
        self.begin_login(username).await;
        if !self.login_delay.is_zero() {
            tokio::time::sleep(self.login_delay).await;
        }
        self.end_login(username).await;

        let mut state = self.state.lock().await;
        state.check(SimulatedOperation::Login)?;

        let valid = state
            .accounts
            .get(username)
            .is_some_and(|expected| expected == password.expose_secret())
            || state.tokens.get(password.expose_secret()).is_some_and(|owner| owner == username);
        if !valid {
            return Err(ProviderError::authentication_failed(format!(
                "login rejected for '{}'",
                username
            )));
        }

        let session_id = Uuid::new_v4().to_string();
        state.sessions.insert(session_id.clone(), username.to_string());
        self.logins.fetch_add(1, Ordering::SeqCst);

        Ok(SessionHandle {
            endpoint: "simulator://vcenter".to_string(),
            username: username.to_string(),
            session_id: SecretString::new(session_id),
            insecure: false,
        })
    }

    async fn logout(&self, session: &SessionHandle) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.check(SimulatedOperation::Logout)?;
        match state.sessions.remove(session.session_id.expose_secret()) {
            Some(_) => {
                self.logouts.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(ProviderError::SessionNotFound),
        }
    }

    async fn issue_token(&self, request: TokenRequest<'_>) -> ProviderResult<SecretString> {
        let mut state = self.state.lock().await;
        state.check(SimulatedOperation::IssueToken)?;
        if !state.user_exists(request.username) {
            return Err(ProviderError::not_found("user", request.username));
        }

        let token = format!("sim-token-{}", Uuid::new_v4().simple());
        state.tokens.insert(token.clone(), request.username.to_string());
        Ok(SecretString::new(token))
    }

    async fn role_exists(&self, role: &str) -> ProviderResult<bool> {
        Ok(self.state.lock().await.roles.contains(role))
    }

    async fn group_exists(&self, group: &str) -> ProviderResult<bool> {
        Ok(self.state.lock().await.groups.contains(group))
    }

    async fn user_exists(&self, username: &str) -> ProviderResult<bool> {
        Ok(self.state.lock().await.user_exists(username))
    }

    async fn create_principal(&self, username: &str, password: &SecretString) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.check(SimulatedOperation::CreatePrincipal)?;
        if state.user_exists(username) {
            return Err(ProviderError::backend(format!("user '{}' already exists", username)));
        }
        state.principals.insert(username.to_string());
        state.accounts.insert(username.to_string(), password.expose_secret().to_string());
        Ok(())
    }

    async fn assign_role(&self, principal: &str, role: &str) -> ProviderResult<String> {
        let mut state = self.state.lock().await;
        state.check(SimulatedOperation::AssignRole)?;
        if !state.roles.contains(role) {
            return Err(ProviderError::not_found("role", role));
        }
        if !state.principals.contains(principal) {
            return Err(ProviderError::not_found("principal", principal));
        }
        let id = format!("assignment-{}", Uuid::new_v4());
        state.assignments.insert(id.clone(), (principal.to_string(), role.to_string()));
        Ok(id)
    }

    async fn add_to_group(&self, principal: &str, group: &str) -> ProviderResult<String> {
        let mut state = self.state.lock().await;
        state.check(SimulatedOperation::AddToGroup)?;
        if !state.groups.contains(group) {
            return Err(ProviderError::not_found("group", group));
        }
        if !state.principals.contains(principal) {
            return Err(ProviderError::not_found("principal", principal));
        }
        let id = format!("membership-{}", Uuid::new_v4());
        state.memberships.insert(id.clone(), (principal.to_string(), group.to_string()));
        Ok(id)
    }

    async fn unassign_role(&self, assignment_id: &str) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.check(SimulatedOperation::UnassignRole)?;
        state.assignments.remove(assignment_id);
        Ok(())
    }

    async fn remove_from_group(&self, membership_id: &str) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.check(SimulatedOperation::RemoveFromGroup)?;
        state.memberships.remove(membership_id);
        Ok(())
    }

    async fn delete_principal(&self, username: &str) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.check(SimulatedOperation::DeletePrincipal)?;
        if state.principals.remove(username) {
            state.accounts.remove(username);
            state.tokens.retain(|_, owner| owner != username);
            state.sessions.retain(|_, owner| owner != username);
        }
        Ok(())
    }
}

/// Factory handing out one shared [`SimulatorProvider`].
#[derive(Debug, Clone)]
pub struct SimulatorFactory {
    provider: Arc<SimulatorProvider>,
    connect_delay: Duration,
    connections: Arc<AtomicUsize>,
}

impl SimulatorFactory {
    pub fn new(provider: Arc<SimulatorProvider>) -> Self {
        Self { provider, connect_delay: Duration::ZERO, connections: Arc::new(AtomicUsize::new(0)) }
    }

    /// Slow down every connect, to widen races between callers.
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn provider(&self) -> &Arc<SimulatorProvider> {
        &self.provider
    }

    /// Number of successful connects.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderFactory for SimulatorFactory {
    async fn connect(&self, settings: &ConnectionSettings) -> ProviderResult<Arc<dyn SessionProvider>> {
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }

        {
            let state = self.provider.state.lock().await;
            state.check(SimulatedOperation::Connect)?;
            if !settings.username.is_empty()
                && state.accounts.get(&settings.username).map(String::as_str)
                    != Some(settings.password.expose_secret())
            {
                return Err(ProviderError::authentication_failed(format!(
                    "login rejected for '{}'",
                    settings.username
                )));
            }
        }

        self.connections.fetch_add(1, Ordering::SeqCst);
        let provider: Arc<dyn SessionProvider> = self.provider.clone();
        Ok(provider)
    }
}
