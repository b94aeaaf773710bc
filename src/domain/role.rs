//! Role records: which credential a role issues and for how long.

use std::collections::BTreeSet;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};

use super::duration_secs;
use super::secret::{exposed_opt, SecretString};
use crate::errors::{Error, Result};

/// Storage prefix of role records.
pub const ROLE_PREFIX: &str = "roles/";

/// Placeholder replaced by a random `[a-z0-9]` character per issuance.
const TEMPLATE_PLACEHOLDER: char = '?';
const TEMPLATE_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Storage key of a role.
pub fn role_key(name: &str) -> String {
    format!("{}{}", ROLE_PREFIX, name)
}

/// Role names are case-insensitive and stored lower-cased.
pub fn normalize_role_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// How a role's credential is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialMode {
    /// Log in with the stored username/password and hand out that session
    Static,
    /// Mint a token for an ephemeral principal holding the role's permissions
    Dynamic,
}

/// A named role as persisted under [`ROLE_PREFIX`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    #[serde(default)]
    pub username: String,

    #[serde(default, with = "exposed_opt", skip_serializing_if = "Option::is_none")]
    pub password: Option<SecretString>,

    #[serde(default)]
    pub permission_roles: BTreeSet<String>,

    #[serde(default)]
    pub permission_groups: BTreeSet<String>,

    /// Zero means the system default lease TTL
    #[serde(default, with = "duration_secs")]
    pub ttl: Duration,

    /// Zero means the system max lease TTL
    #[serde(default, with = "duration_secs")]
    pub max_ttl: Duration,
}

impl RoleRecord {
    pub fn has_password(&self) -> bool {
        self.password.as_ref().is_some_and(|p| !p.is_empty())
    }

    pub fn has_permissions(&self) -> bool {
        !self.permission_roles.is_empty() || !self.permission_groups.is_empty()
    }

    /// A non-empty password selects the static mode.
    pub fn credential_mode(&self) -> CredentialMode {
        if self.has_password() {
            CredentialMode::Static
        } else {
            CredentialMode::Dynamic
        }
    }

    /// Invariants checked on every write.
    pub fn validate(&self) -> Result<()> {
        if !self.ttl.is_zero() && !self.max_ttl.is_zero() && self.ttl > self.max_ttl {
            return Err(Error::validation_field("ttl cannot be greater than max_ttl", "ttl"));
        }

        match (self.has_password(), self.has_permissions()) {
            (false, false) => Err(Error::validation(
                "either vSphere role definitions, group definitions, or a username and password must be provided",
            )),
            (true, true) => Err(Error::validation(
                "a role with a static password cannot also define vSphere roles or groups",
            )),
            (true, false) if self.username.is_empty() || self.username.contains(TEMPLATE_PLACEHOLDER) => {
                Err(Error::validation_field(
                    "a static role requires an explicit username",
                    "username",
                ))
            }
            _ => Ok(()),
        }
    }

    /// Name for a new ephemeral principal, expanding `?` placeholders in the username.
    pub fn principal_name<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        self.username
            .chars()
            .map(|c| {
                if c == TEMPLATE_PLACEHOLDER {
                    TEMPLATE_ALPHABET[rng.gen_range(0..TEMPLATE_ALPHABET.len())] as char
                } else {
                    c
                }
            })
            .collect()
    }

    pub fn view(&self) -> RoleView {
        RoleView {
            username: self.username.clone(),
            credential_type: self.credential_mode(),
            permission_roles: self.permission_roles.iter().cloned().collect(),
            permission_groups: self.permission_groups.iter().cloned().collect(),
            ttl: self.ttl.as_secs(),
            max_ttl: self.max_ttl.as_secs(),
        }
    }

    /// Merge a write request onto this record.
    ///
    /// An empty username falls back to `<name>-???`.
    pub fn apply(&mut self, name: &str, update: RoleUpdate) {
        if let Some(username) = update.username {
            self.username = username;
        }
        if let Some(password) = update.password {
            self.password = if password.is_empty() { None } else { Some(password) };
        }
        if let Some(roles) = update.permission_roles {
            self.permission_roles = roles.into_iter().collect();
        }
        if let Some(groups) = update.permission_groups {
            self.permission_groups = groups.into_iter().collect();
        }
        if let Some(ttl) = update.ttl {
            self.ttl = Duration::from_secs(ttl);
        }
        if let Some(max_ttl) = update.max_ttl {
            self.max_ttl = Duration::from_secs(max_ttl);
        }

        if self.username.is_empty() && !self.has_password() {
            self.username = format!("{}-???", name);
        }
    }
}

/// Partial role write. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleUpdate {
    pub username: Option<String>,
    pub password: Option<SecretString>,

    #[serde(default, alias = "vsphere_roles", deserialize_with = "list_or_csv")]
    pub permission_roles: Option<Vec<String>>,

    #[serde(default, alias = "vsphere_groups", deserialize_with = "list_or_csv")]
    pub permission_groups: Option<Vec<String>>,

    /// Seconds
    pub ttl: Option<u64>,
    /// Seconds
    pub max_ttl: Option<u64>,
}

/// Role as returned to callers, without the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleView {
    pub username: String,
    pub credential_type: CredentialMode,
    pub permission_roles: Vec<String>,
    pub permission_groups: Vec<String>,
    pub ttl: u64,
    pub max_ttl: u64,
}

/// Accept `["a", "b"]` or `"a, b"`.
fn list_or_csv<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrCsv {
        List(Vec<String>),
        Csv(String),
    }

    let raw = Option::<ListOrCsv>::deserialize(deserializer)?;
    let items = match raw {
        None => return Ok(None),
        Some(ListOrCsv::List(items)) => items,
        Some(ListOrCsv::Csv(csv)) => csv.split(',').map(str::to_string).collect(),
    };

    Ok(Some(
        items.into_iter().map(|item| item.trim().to_string()).filter(|item| !item.is_empty()).collect(),
    ))
}
