//! Domain layer
//!
//! Records and values shared by the backend, storage and transport layers:
//! the stored connection configuration, role records, issued secrets and
//! their leases. Types here validate themselves and carry no I/O.
//!
//! ## Module Organization
//!
//! - `secret`: redacting `SecretString` plus serde adapters for fields that persist the value
//! - `config`: stored connection configuration
//! - `role`: role records and partial updates
//! - `session`: authenticated session handles
//! - `lease`: issued secrets, payloads and lease timing

pub mod config;
pub mod lease;
pub mod role;
pub mod secret;
pub mod session;

pub use config::{ConfigUpdate, ConfigView, StoredConfig, CONFIG_KEY};
pub use lease::{IssuedSecret, Lease, LeaseDefaults, LeaseId, SecretInternal, SecretPayload};
pub use role::{
    normalize_role_name, role_key, CredentialMode, RoleRecord, RoleUpdate, RoleView, ROLE_PREFIX,
};
pub use secret::SecretString;
pub use session::SessionHandle;

/// Serde adapter storing a `Duration` as whole seconds.
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
