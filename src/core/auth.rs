use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::store::KvStore;

/// Fixed storage key for the current session's credential blob.
pub const AUTH_HEADERS_KEY: &str = "auth_headers";

/// A bearer token shorter than this cannot be real; "Bearer " alone is 7 chars.
const MIN_AUTHORIZATION_LEN: usize = 10;

/// The header set sent with every authenticated platform request.
///
/// Serialized field names match the wire header names so the stored blob can be
/// applied to a request without translation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthHeaders {
    #[serde(rename = "Authorization", default)]
    pub authorization: String,
    #[serde(rename = "x-client-id", default)]
    pub client_id: String,
    #[serde(rename = "x-project-id", default)]
    pub project_id: String,
    #[serde(rename = "x-workspace-id", default)]
    pub workspace_id: String,
}

impl AuthHeaders {
    /// Build headers from a raw token, adding the `Bearer ` prefix when absent.
    pub fn with_token(token: &str, client_id: &str, project_id: &str, workspace_id: &str) -> Self {
        let authorization = if token.starts_with("Bearer ") {
            token.to_string()
        } else {
            format!("Bearer {}", token)
        };
        Self {
            authorization,
            client_id: client_id.to_string(),
            project_id: project_id.to_string(),
            workspace_id: workspace_id.to_string(),
        }
    }

    /// Shape check only: present, bearer-prefixed, and long enough to be a
    /// token. No signature or expiry validation happens client-side.
    pub fn is_authenticated(&self) -> bool {
        self.authorization.starts_with("Bearer ")
            && self.authorization.len() > MIN_AUTHORIZATION_LEN
    }
}

/// Persists the session credential through the [`KvStore`] seam.
pub struct CredentialStore {
    store: Arc<dyn KvStore>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Load the stored credential. Corrupt JSON is treated as absent.
    pub async fn load(&self) -> Result<Option<AuthHeaders>> {
        let Some(raw) = self.store.load(AUTH_HEADERS_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(headers) => Ok(Some(headers)),
            Err(e) => {
                warn!("Stored auth headers are not valid JSON, ignoring: {}", e);
                Ok(None)
            }
        }
    }

    pub async fn save(&self, headers: &AuthHeaders) -> Result<()> {
        let raw = serde_json::to_string(headers)?;
        self.store.save(AUTH_HEADERS_KEY, &raw).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.remove(AUTH_HEADERS_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MemoryStore;

    #[test]
    fn bearer_prefix_is_added_once() {
        let a = AuthHeaders::with_token("abc123token", "", "", "");
        assert_eq!(a.authorization, "Bearer abc123token");
        let b = AuthHeaders::with_token("Bearer abc123token", "", "", "");
        assert_eq!(b.authorization, "Bearer abc123token");
    }

    #[test]
    fn authenticated_requires_bearer_prefix_and_length() {
        assert!(AuthHeaders::with_token("a-long-enough-token", "", "", "").is_authenticated());
        assert!(!AuthHeaders::with_token("ab", "", "", "").is_authenticated());
        assert!(!AuthHeaders::default().is_authenticated());

        let raw = AuthHeaders {
            authorization: "token-without-prefix-but-long".to_string(),
            ..Default::default()
        };
        assert!(!raw.is_authenticated());
    }

    #[tokio::test]
    async fn save_load_clear_roundtrip() {
        let creds = CredentialStore::new(Arc::new(MemoryStore::new()));
        let headers = AuthHeaders::with_token("abc123token", "client-1", "proj-1", "ws-1");
        creds.save(&headers).await.unwrap();
        assert_eq!(creds.load().await.unwrap(), Some(headers));
        creds.clear().await.unwrap();
        assert_eq!(creds.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_stored_headers_are_treated_as_absent() {
        let store = Arc::new(MemoryStore::new());
        store.save(AUTH_HEADERS_KEY, "{not json").await.unwrap();
        let creds = CredentialStore::new(store);
        assert_eq!(creds.load().await.unwrap(), None);
    }
}
