//! Authenticated vSphere session handles.

use serde::{Deserialize, Serialize};

use super::secret::{exposed, SecretString};

/// An authenticated session, serializable into a secret's payload.
///
/// The session id is the credential; `Debug` redacts it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHandle {
    /// Endpoint the session was opened against
    pub endpoint: String,
    pub username: String,
    #[serde(with = "exposed")]
    pub session_id: SecretString,
    #[serde(default)]
    pub insecure: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_survives_serialization_but_not_debug() {
        let handle = SessionHandle {
            endpoint: "https://vc.local".into(),
            username: "svc".into(),
            session_id: "b00c3f1e".into(),
            insecure: true,
        };

        assert!(!format!("{:?}", handle).contains("b00c3f1e"));

        let json = serde_json::to_string(&handle).unwrap();
        let decoded: SessionHandle = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, handle);
    }
}
