//! Credential issuance, renewal and revocation.
//!
//! Issuance runs role lookup, then client acquisition, then a branch on the
//! role's credential mode:
//!
//! - **static**: log in with the stored username/password while holding that
//!   username's identity lock, and hand out the session handle.
//! - **dynamic**: create an ephemeral principal, grant the role's permission
//!   roles and groups, and mint a token for it. If any step fails, the
//!   objects already created are torn down before the error is returned.
//!
//! Renewal makes no remote call. Revocation closes the static session, or
//! tears down the ephemeral principal; only the principal deletion is
//! required, the rest produce warnings.

use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, info, instrument, warn, Instrument};

use super::client_cache::ClientCache;
use super::config_store::ConfigStore;
use super::locks::IdentityLockTable;
use super::roles::RoleStore;
use crate::domain::{
    normalize_role_name, CredentialMode, IssuedSecret, Lease, LeaseDefaults, RoleRecord,
    SecretInternal, SecretPayload, SecretString, SessionHandle,
};
use crate::errors::{Error, Result};
use crate::observability::MetricsRecorder;
use crate::provider::{ProviderError, ProviderResult, SessionProvider, TokenRequest};

/// Attempts at finding an unused ephemeral principal name.
const PRINCIPAL_NAME_ATTEMPTS: usize = 5;
const GENERATED_PASSWORD_LEN: usize = 32;

/// Result of a successful revocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RevocationOutcome {
    /// Cleanup steps that failed without failing the revocation
    pub warnings: Vec<String>,
}

#[derive(Debug)]
pub struct IssuanceEngine {
    roles: RoleStore,
    config: ConfigStore,
    cache: Arc<ClientCache>,
    locks: Arc<IdentityLockTable>,
    lease_defaults: LeaseDefaults,
    metrics: MetricsRecorder,
}

impl IssuanceEngine {
    pub fn new(
        roles: RoleStore,
        config: ConfigStore,
        cache: Arc<ClientCache>,
        locks: Arc<IdentityLockTable>,
        lease_defaults: LeaseDefaults,
    ) -> Self {
        Self { roles, config, cache, locks, lease_defaults, metrics: MetricsRecorder::new() }
    }

    pub fn lease_defaults(&self) -> LeaseDefaults {
        self.lease_defaults
    }

    /// Produce a lease-bearing secret for the named role.
    #[instrument(skip(self), fields(role = %name))]
    pub async fn issue(&self, name: &str) -> Result<IssuedSecret> {
        let name = normalize_role_name(name);
        let role = self.roles.get(&name).await?.ok_or_else(|| Error::not_found("role", &name))?;
        let client = self.cache.get_client(&self.config).await?;
        let provider = client.provider().as_ref();

        let (secret_type, result) = match role.credential_mode() {
            CredentialMode::Static => {
                ("static_session", self.issue_static(&name, &role, provider).await)
            }
            CredentialMode::Dynamic => ("session", self.issue_dynamic(&name, &role, provider).await),
        };

        self.metrics.record_issuance(secret_type, result.is_ok());
        if let Ok(secret) = &result {
            info!(lease_id = %secret.lease_id, secret_type, "issued credential");
        }
        result
    }

    async fn issue_static(
        &self,
        name: &str,
        role: &RoleRecord,
        provider: &dyn SessionProvider,
    ) -> Result<IssuedSecret> {
        let password = role.password.clone().unwrap_or_default();

        let session = {
            let _guard = self.locks.lock(&role.username).await;
            provider
                .login(&role.username, &password)
                .await
                .map_err(|source| Error::LoginFailed { username: role.username.clone(), source })?
        };

        Ok(IssuedSecret::new(
            name,
            SecretPayload::StaticSession { session },
            SecretInternal { role: name.to_string(), ..Default::default() },
            Lease::new(role.ttl, role.max_ttl),
        ))
    }

    async fn issue_dynamic(
        &self,
        name: &str,
        role: &RoleRecord,
        provider: &dyn SessionProvider,
    ) -> Result<IssuedSecret> {
        let issuance_error = |source| Error::Issuance { role: name.to_string(), source };

        let principal = self.unused_principal_name(role, provider).await.map_err(issuance_error)?;
        let _guard = self.locks.lock(&principal).await;

        let password = generate_password();
        provider.create_principal(&principal, &password).await.map_err(issuance_error)?;
        debug!(principal = %principal, "created ephemeral principal");

        let mut internal = SecretInternal {
            role: name.to_string(),
            principal: Some(principal.clone()),
            ..Default::default()
        };

        match self.grant_and_mint(role, &principal, &password, provider, &mut internal).await {
            Ok(token) => Ok(IssuedSecret::new(
                name,
                SecretPayload::Session { username: principal, token },
                internal,
                Lease::new(role.ttl, role.max_ttl),
            )),
            Err(source) => {
                warn!(principal = %principal, error = %source, "dynamic issuance failed, rolling back");
                rollback(provider, &internal).await;
                Err(issuance_error(source))
            }
        }
    }

    async fn grant_and_mint(
        &self,
        role: &RoleRecord,
        principal: &str,
        password: &SecretString,
        provider: &dyn SessionProvider,
        internal: &mut SecretInternal,
    ) -> ProviderResult<SecretString> {
        for permission_role in &role.permission_roles {
            let id = provider.assign_role(principal, permission_role).await?;
            internal.role_assignment_ids.push(id);
        }
        for group in &role.permission_groups {
            let id = provider.add_to_group(principal, group).await?;
            internal.group_membership_ids.push(id);
        }

        let lease = Lease::new(role.ttl, role.max_ttl);
        provider
            .issue_token(TokenRequest {
                username: principal,
                password,
                lifetime: self.lease_defaults.effective_max_ttl(&lease),
                renewable: true,
                delegatable: false,
            })
            .await
    }

    async fn unused_principal_name(
        &self,
        role: &RoleRecord,
        provider: &dyn SessionProvider,
    ) -> ProviderResult<String> {
        for _ in 0..PRINCIPAL_NAME_ATTEMPTS {
            let candidate = role.principal_name(&mut rand::thread_rng());
            match provider.user_exists(&candidate).await {
                Ok(false) => return Ok(candidate),
                Ok(true) => debug!(candidate = %candidate, "principal name taken"),
                Err(ProviderError::Unsupported { .. }) => return Ok(candidate),
                Err(e) => return Err(e),
            }
        }
        Err(ProviderError::backend(format!(
            "no unused principal name for template '{}'",
            role.username
        )))
    }

    /// Re-stamp the lease from the current role. `None` when the role is gone.
    pub async fn renew(&self, secret: &IssuedSecret) -> Result<Option<IssuedSecret>> {
        let span = crate::lease_span!("renew", secret.lease_id, role = %secret.internal.role);
        async {
            let renewed = self.roles.get(&secret.internal.role).await?.map(|role| {
                let mut renewed = secret.clone();
                renewed.lease = Lease::new(role.ttl, role.max_ttl);
                renewed
            });

            self.metrics.record_renewal(renewed.is_some());
            if renewed.is_none() {
                info!("role no longer exists, lease will not be renewed");
            }
            Ok::<_, Error>(renewed)
        }
        .instrument(span)
        .await
    }

    /// Revoke an issued secret.
    pub async fn revoke(&self, secret: &IssuedSecret) -> Result<RevocationOutcome> {
        let secret_type = secret.data.secret_type();
        let span = crate::lease_span!("revoke", secret.lease_id, secret_type);
        async {
            let client = self.cache.get_client(&self.config).await?;
            let provider = client.provider().as_ref();

            let result = match &secret.data {
                SecretPayload::StaticSession { session } => {
                    self.revoke_static(session, provider).await
                }
                SecretPayload::Session { .. } => self.revoke_dynamic(&secret.internal, provider).await,
            };

            match &result {
                Ok(outcome) => {
                    self.metrics.record_revocation(secret_type, true, outcome.warnings.len());
                    info!(warnings = outcome.warnings.len(), "revoked credential");
                }
                Err(e) => {
                    self.metrics.record_revocation(secret_type, false, 0);
                    warn!(error = %e, "revocation failed");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn revoke_static(
        &self,
        session: &SessionHandle,
        provider: &dyn SessionProvider,
    ) -> Result<RevocationOutcome> {
        let _guard = self.locks.lock(&session.username).await;

        match provider.logout(session).await {
            Ok(()) => Ok(RevocationOutcome::default()),
            Err(e) if e.is_not_found() => {
                info!(username = %session.username, "session already closed");
                Ok(RevocationOutcome {
                    warnings: vec![format!("session for '{}' was already closed", session.username)],
                })
            }
            Err(e) => Err(Error::Revocation(e)),
        }
    }

    async fn revoke_dynamic(
        &self,
        internal: &SecretInternal,
        provider: &dyn SessionProvider,
    ) -> Result<RevocationOutcome> {
        let principal = internal
            .principal
            .as_deref()
            .ok_or_else(|| Error::validation("secret does not reference an ephemeral principal"))?;
        let _guard = self.locks.lock(principal).await;

        let warnings = release_permissions(provider, internal).await;

        match provider.delete_principal(principal).await {
            Ok(()) => Ok(RevocationOutcome { warnings }),
            Err(e) if e.is_not_found() => Ok(RevocationOutcome { warnings }),
            Err(e) => Err(Error::Revocation(e)),
        }
    }
}

/// Remove group memberships and role assignments, collecting failures.
async fn release_permissions(provider: &dyn SessionProvider, internal: &SecretInternal) -> Vec<String> {
    let mut warnings = Vec::new();

    for id in &internal.group_membership_ids {
        if let Err(e) = provider.remove_from_group(id).await {
            warn!(membership_id = %id, error = %e, "failed to remove group membership");
            warnings.push(format!("failed to remove group membership '{}': {}", id, e));
        }
    }
    for id in &internal.role_assignment_ids {
        if let Err(e) = provider.unassign_role(id).await {
            warn!(assignment_id = %id, error = %e, "failed to remove role assignment");
            warnings.push(format!("failed to remove role assignment '{}': {}", id, e));
        }
    }

    warnings
}

/// Undo a partially created dynamic credential. Failures are only logged.
async fn rollback(provider: &dyn SessionProvider, internal: &SecretInternal) {
    release_permissions(provider, internal).await;

    if let Some(principal) = &internal.principal {
        if let Err(e) = provider.delete_principal(principal).await {
            warn!(principal = %principal, error = %e, "failed to delete principal during rollback");
        }
    }
}

fn generate_password() -> SecretString {
    let password: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect();
    SecretString::new(password)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RoleUpdate, StoredConfig};
    use crate::errors::ErrorKind;
    use crate::provider::{SimulatedOperation, SimulatorFactory, SimulatorProvider};
    use crate::settings::{EnvOverrides, OverrideSource, SettingsResolver};
    use crate::storage::InMemoryStorage;
    use std::time::Duration;
    use tracing_test::traced_test;

    struct Harness {
        engine: IssuanceEngine,
        roles: RoleStore,
        sim: Arc<SimulatorProvider>,
    }

    async fn harness(sim: SimulatorProvider) -> Harness {
        let sim = Arc::new(sim.with_account("admin", "pw"));
        let storage = Arc::new(InMemoryStorage::new());
        let config = ConfigStore::new(storage.clone());
        config
            .put(&StoredConfig {
                url: "https://vc.local".into(),
                username: "admin".into(),
                password: "pw".into(),
                insecure: false,
            })
            .await
            .unwrap();

        let roles = RoleStore::new(storage);
        let cache = Arc::new(ClientCache::new(
            SettingsResolver::default(),
            OverrideSource::Fixed(EnvOverrides::default()),
            Arc::new(SimulatorFactory::new(sim.clone())),
        ));
        let engine = IssuanceEngine::new(
            roles.clone(),
            config,
            cache,
            Arc::new(IdentityLockTable::new()),
            LeaseDefaults::default(),
        );
        Harness { engine, roles, sim }
    }

    async fn put_role(roles: &RoleStore, name: &str, update: RoleUpdate) {
        let mut role = RoleRecord::default();
        role.apply(name, update);
        roles.put(name, &role).await.unwrap();
    }

    fn static_update(username: &str, password: &str) -> RoleUpdate {
        RoleUpdate {
            username: Some(username.into()),
            password: Some(password.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_unknown_role() {
        let h = harness(SimulatorProvider::new()).await;
        let err = h.engine.issue("missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_static_issue_and_revoke_twice() {
        let h = harness(SimulatorProvider::new().with_account("svc", "secret")).await;
        put_role(&h.roles, "db", static_update("svc", "secret")).await;

        let secret = h.engine.issue("db").await.unwrap();
        let SecretPayload::StaticSession { session } = &secret.data else {
            panic!("expected a static session");
        };
        assert_eq!(session.username, "svc");
        assert_eq!(h.sim.active_sessions().await, 1);

        let outcome = h.engine.revoke(&secret).await.unwrap();
        assert!(outcome.warnings.is_empty());
        assert_eq!(h.sim.active_sessions().await, 0);

        let outcome = h.engine.revoke(&secret).await.unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(h.sim.logout_count(), 1);
    }

    #[tokio::test]
    async fn test_static_login_failure() {
        let h = harness(SimulatorProvider::new().with_account("svc", "secret")).await;
        put_role(&h.roles, "db", static_update("svc", "wrong")).await;

        let err = h.engine.issue("db").await.unwrap_err();
        assert!(matches!(err, Error::LoginFailed { ref username, .. } if username == "svc"));
    }

    #[tokio::test]
    async fn test_static_revoke_remote_failure_is_fatal() {
        let h = harness(SimulatorProvider::new().with_account("svc", "secret")).await;
        put_role(&h.roles, "db", static_update("svc", "secret")).await;
        let secret = h.engine.issue("db").await.unwrap();

        h.sim.fail(SimulatedOperation::Logout).await;
        let err = h.engine.revoke(&secret).await.unwrap_err();
        assert!(matches!(err, Error::Revocation(_)));
    }

    #[tokio::test]
    async fn test_dynamic_issue_and_revoke() {
        let h = harness(SimulatorProvider::new().with_role("ReadOnly").with_group("ops")).await;
        put_role(
            &h.roles,
            "web",
            RoleUpdate {
                permission_roles: Some(vec!["ReadOnly".into()]),
                permission_groups: Some(vec!["ops".into()]),
                ttl: Some(20),
                max_ttl: Some(30),
                ..Default::default()
            },
        )
        .await;

        let secret = h.engine.issue("web").await.unwrap();
        let SecretPayload::Session { username, token } = &secret.data else {
            panic!("expected a dynamic session");
        };
        assert!(username.starts_with("web-"));
        assert!(!token.is_empty());
        assert_eq!(secret.internal.principal.as_deref(), Some(username.as_str()));
        assert_eq!(secret.internal.role_assignment_ids.len(), 1);
        assert_eq!(secret.internal.group_membership_ids.len(), 1);
        assert_eq!(secret.lease.ttl, Duration::from_secs(20));
        assert_eq!(secret.lease.max_ttl, Duration::from_secs(30));
        assert_eq!(h.sim.principals().await, vec![username.clone()]);

        let outcome = h.engine.revoke(&secret).await.unwrap();
        assert!(outcome.warnings.is_empty());
        assert!(h.sim.principals().await.is_empty());
        assert_eq!(h.sim.assignment_count().await, 0);
        assert_eq!(h.sim.membership_count().await, 0);
    }

    #[tokio::test]
    async fn test_dynamic_partial_failure_rolls_back() {
        let h = harness(SimulatorProvider::new().with_role("ReadOnly").with_group("ops")).await;
        put_role(
            &h.roles,
            "web",
            RoleUpdate {
                permission_roles: Some(vec!["ReadOnly".into()]),
                permission_groups: Some(vec!["ops".into()]),
                ..Default::default()
            },
        )
        .await;

        h.sim.fail(SimulatedOperation::AddToGroup).await;
        let err = h.engine.issue("web").await.unwrap_err();
        assert!(matches!(err, Error::Issuance { ref role, .. } if role == "web"));

        assert!(h.sim.principals().await.is_empty());
        assert_eq!(h.sim.assignment_count().await, 0);
        assert_eq!(h.sim.membership_count().await, 0);
    }

    #[tokio::test]
    async fn test_dynamic_issue_with_vanished_remote_role_is_internal() {
        let h = harness(SimulatorProvider::new()).await;
        put_role(
            &h.roles,
            "web",
            RoleUpdate { permission_roles: Some(vec!["Retired".into()]), ..Default::default() },
        )
        .await;

        let err = h.engine.issue("web").await.unwrap_err();
        assert!(matches!(err, Error::Issuance { .. }));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.status_code(), 500);
        assert!(h.sim.principals().await.is_empty());
    }

    #[tokio::test]
    async fn test_dynamic_revoke_warnings_and_required_delete() {
        let h = harness(SimulatorProvider::new().with_role("ReadOnly")).await;
        put_role(
            &h.roles,
            "web",
            RoleUpdate { permission_roles: Some(vec!["ReadOnly".into()]), ..Default::default() },
        )
        .await;
        let secret = h.engine.issue("web").await.unwrap();

        h.sim.fail(SimulatedOperation::UnassignRole).await;
        h.sim.fail(SimulatedOperation::DeletePrincipal).await;
        let err = h.engine.revoke(&secret).await.unwrap_err();
        assert!(matches!(err, Error::Revocation(_)));

        h.sim.recover(SimulatedOperation::DeletePrincipal).await;
        let outcome = h.engine.revoke(&secret).await.unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("role assignment"));
        assert!(h.sim.principals().await.is_empty());
    }

    #[tokio::test]
    async fn test_renew_uses_current_role() {
        let h = harness(SimulatorProvider::new().with_account("svc", "secret")).await;
        let mut update = static_update("svc", "secret");
        update.ttl = Some(20);
        update.max_ttl = Some(30);
        put_role(&h.roles, "db", update).await;

        let secret = h.engine.issue("db").await.unwrap();
        let logins = h.sim.login_count();

        let mut role = h.roles.get("db").await.unwrap().unwrap();
        role.ttl = Duration::from_secs(25);
        h.roles.put("db", &role).await.unwrap();

        let renewed = h.engine.renew(&secret).await.unwrap().unwrap();
        assert_eq!(renewed.lease.ttl, Duration::from_secs(25));
        assert_eq!(renewed.lease.max_ttl, Duration::from_secs(30));
        assert_eq!(renewed.data, secret.data);
        assert_eq!(h.sim.login_count(), logins);

        h.roles.delete("db").await.unwrap();
        assert!(h.engine.renew(&secret).await.unwrap().is_none());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_issuance_logs_never_contain_credentials() {
        let h = harness(SimulatorProvider::new().with_account("svc", "hunter2-static")).await;
        put_role(&h.roles, "db", static_update("svc", "hunter2-static")).await;

        let secret = h.engine.issue("db").await.unwrap();
        h.engine.revoke(&secret).await.unwrap();

        let SecretPayload::StaticSession { session } = &secret.data else {
            panic!("expected a static session");
        };
        assert!(logs_contain("issued credential"));
        assert!(logs_contain("revoked credential"));
        assert!(!logs_contain("hunter2-static"));
        assert!(!logs_contain(session.session_id.expose_secret()));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_rollback_is_logged() {
        let h = harness(SimulatorProvider::new().with_role("ReadOnly")).await;
        put_role(
            &h.roles,
            "web",
            RoleUpdate { permission_roles: Some(vec!["ReadOnly".into()]), ..Default::default() },
        )
        .await;

        h.sim.fail(SimulatedOperation::IssueToken).await;
        assert!(h.engine.issue("web").await.is_err());
        assert!(logs_contain("dynamic issuance failed, rolling back"));
    }

    #[test]
    fn test_generated_password() {
        let password = generate_password();
        assert_eq!(password.len(), GENERATED_PASSWORD_LEN);
        assert!(password.expose_secret().chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
