//! Stored vSphere connection configuration.

use serde::{Deserialize, Serialize};
use url::Url;

use super::secret::{exposed, SecretString};
use crate::errors::{Error, Result};

/// Storage key of the single configuration record.
pub const CONFIG_KEY: &str = "config";

/// Connection configuration persisted at [`CONFIG_KEY`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, with = "exposed")]
    pub password: SecretString,
    #[serde(default)]
    pub insecure: bool,
}

/// Partial configuration write. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigUpdate {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub insecure: Option<bool>,
}

/// Configuration as returned to callers, without the password.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigView {
    pub url: String,
    pub username: String,
    pub insecure: bool,
}

impl StoredConfig {
    /// Merge a write request onto this record.
    pub fn apply(&mut self, update: ConfigUpdate) {
        if let Some(url) = update.url {
            self.url = url;
        }
        if let Some(username) = update.username {
            self.username = username;
        }
        if let Some(password) = update.password {
            self.password = password;
        }
        if let Some(insecure) = update.insecure {
            self.insecure = insecure;
        }
    }

    /// Check the record before it is written. All problems are reported together.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.url.trim().is_empty() {
            problems.push("url cannot be empty".to_string());
        } else if let Err(e) = Url::parse(&self.url) {
            problems.push(format!("invalid url '{}': {}", self.url, e));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::validation_field(problems.join("; "), "url"))
        }
    }

    pub fn view(&self) -> ConfigView {
        ConfigView { url: self.url.clone(), username: self.username.clone(), insecure: self.insecure }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_keeps_absent_fields() {
        let mut config = StoredConfig {
            url: "https://vc.local".into(),
            username: "admin".into(),
            password: "pw".into(),
            insecure: true,
        };

        config.apply(ConfigUpdate { username: Some("root".into()), ..Default::default() });

        assert_eq!(config.url, "https://vc.local");
        assert_eq!(config.username, "root");
        assert_eq!(config.password.expose_secret(), "pw");
        assert!(config.insecure);
    }

    #[test]
    fn test_validate_collects_problems() {
        let config = StoredConfig { url: "   ".into(), ..Default::default() };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("url cannot be empty"));
        assert!(matches!(err, Error::Validation { field: Some(ref f), .. } if f == "url"));

        let config = StoredConfig { url: "vc.local/sdk".into(), ..Default::default() };
        assert!(config.validate().unwrap_err().to_string().contains("invalid url"));

        let config = StoredConfig { url: "https://vc.local/sdk".into(), ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_view_omits_password_and_storage_keeps_it() {
        let config = StoredConfig {
            url: "https://vc.local".into(),
            username: "admin".into(),
            password: "hunter2".into(),
            insecure: false,
        };

        let view = serde_json::to_value(config.view()).unwrap();
        assert!(view.get("password").is_none());

        let stored = serde_json::to_string(&config).unwrap();
        assert!(stored.contains("hunter2"));
        let decoded: StoredConfig = serde_json::from_str(&stored).unwrap();
        assert_eq!(decoded, config);
    }
}
