//! Issued secrets and their leases.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::duration_secs;
use super::secret::{exposed, SecretString};
use super::session::SessionHandle;

/// Lease timing carried by an issued secret. Zero values defer to [`LeaseDefaults`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    #[serde(with = "duration_secs")]
    pub ttl: Duration,
    #[serde(with = "duration_secs")]
    pub max_ttl: Duration,
    #[serde(default = "renewable_default")]
    pub renewable: bool,
}

fn renewable_default() -> bool {
    true
}

impl Lease {
    pub fn new(ttl: Duration, max_ttl: Duration) -> Self {
        Self { ttl, max_ttl, renewable: true }
    }
}

/// System lease defaults: the mount's view of TTLs when a role leaves them at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseDefaults {
    pub default_ttl: Duration,
    pub max_ttl: Duration,
}

impl Default for LeaseDefaults {
    fn default() -> Self {
        Self { default_ttl: Duration::from_secs(3600), max_ttl: Duration::from_secs(12 * 3600) }
    }
}

impl LeaseDefaults {
    pub fn new(default_ttl: Duration, max_ttl: Duration) -> Self {
        Self { default_ttl, max_ttl }
    }

    /// Max TTL of a lease, never above the system max.
    pub fn effective_max_ttl(&self, lease: &Lease) -> Duration {
        if lease.max_ttl.is_zero() {
            self.max_ttl
        } else {
            lease.max_ttl.min(self.max_ttl)
        }
    }

    /// TTL a lease actually runs for.
    pub fn effective_ttl(&self, lease: &Lease) -> Duration {
        let ttl = if lease.ttl.is_zero() { self.default_ttl } else { lease.ttl };
        ttl.min(self.effective_max_ttl(lease))
    }
}

/// Identifier of an issued secret's lease.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseId(String);

impl LeaseId {
    /// `session/<role>/<uuid>`
    pub fn generate(role: &str) -> Self {
        Self(format!("session/{}/{}", role, Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LeaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the caller receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SecretPayload {
    /// Token minted for an ephemeral principal
    Session {
        username: String,
        #[serde(with = "exposed")]
        token: SecretString,
    },
    /// Session opened with a static role's stored credentials
    StaticSession { session: SessionHandle },
}

impl SecretPayload {
    pub fn secret_type(&self) -> &'static str {
        match self {
            SecretPayload::Session { .. } => "session",
            SecretPayload::StaticSession { .. } => "static_session",
        }
    }
}

/// Housekeeping data needed to renew and revoke.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretInternal {
    pub role: String,

    /// Ephemeral principal backing a dynamic secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub role_assignment_ids: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_membership_ids: Vec<String>,
}

/// A lease-bearing secret produced for a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedSecret {
    pub lease_id: LeaseId,
    pub data: SecretPayload,
    pub internal: SecretInternal,
    pub lease: Lease,
    pub issued_at: DateTime<Utc>,
}

impl IssuedSecret {
    pub fn new(role: &str, data: SecretPayload, internal: SecretInternal, lease: Lease) -> Self {
        Self { lease_id: LeaseId::generate(role), data, internal, lease, issued_at: Utc::now() }
    }
}
