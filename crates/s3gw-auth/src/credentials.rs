//! The Credential Store.
//!
//! Loaded once at startup and shared read-only by every request.

use std::collections::HashMap;

use crate::error::AuthError;

/// Looks up secrets and the admin flag by access key ID.
pub trait CredentialProvider: Send + Sync {
    /// Retrieve the secret access key for the given access key ID.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::AccessKeyNotFound`] if the access key ID is not recognized.
    fn get_secret_key(&self, access_key_id: &str) -> Result<String, AuthError>;

    /// Whether the access key belongs to the admin identity.
    fn is_admin(&self, access_key_id: &str) -> bool;
}

#[derive(Clone)]
struct Entry {
    secret_key: String,
    admin: bool,
}

/// In-memory credential store: one admin pair plus any number of accounts.
#[derive(Clone, Default)]
pub struct StaticCredentialProvider {
    credentials: HashMap<String, Entry>,
}

impl std::fmt::Debug for StaticCredentialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&str> = self.credentials.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("StaticCredentialProvider")
            .field("access_keys", &keys)
            .finish()
    }
}

impl StaticCredentialProvider {
    /// Create a store of regular accounts from `(access_key_id, secret_key)` pairs.
    pub fn new(credentials: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            credentials: credentials
                .into_iter()
                .map(|(ak, sk)| {
                    (
                        ak,
                        Entry {
                            secret_key: sk,
                            admin: false,
                        },
                    )
                })
                .collect(),
        }
    }

    /// Register the admin pair. An account with the same key is replaced.
    #[must_use]
    pub fn with_admin(mut self, access_key_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        self.credentials.insert(
            access_key_id.into(),
            Entry {
                secret_key: secret_key.into(),
                admin: true,
            },
        );
        self
    }

    /// Number of known access keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn get_secret_key(&self, access_key_id: &str) -> Result<String, AuthError> {
        self.credentials
            .get(access_key_id)
            .map(|e| e.secret_key.clone())
            .ok_or_else(|| AuthError::AccessKeyNotFound(access_key_id.to_owned()))
    }

    fn is_admin(&self, access_key_id: &str) -> bool {
        self.credentials
            .get(access_key_id)
            .is_some_and(|e| e.admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_return_secret_key_for_known_access_key() {
        let provider =
            StaticCredentialProvider::new(vec![("AKID".to_owned(), "secret".to_owned())]);

        assert_eq!(provider.get_secret_key("AKID").unwrap(), "secret");
        assert!(!provider.is_admin("AKID"));
    }

    #[test]
    fn test_should_return_error_for_unknown_access_key() {
        let provider = StaticCredentialProvider::new(vec![]);

        let result = provider.get_secret_key("UNKNOWN");
        assert!(matches!(result, Err(AuthError::AccessKeyNotFound(_))));
        assert!(!provider.is_admin("UNKNOWN"));
    }

    #[test]
    fn test_should_flag_admin_key() {
        let provider = StaticCredentialProvider::new(vec![("user".to_owned(), "s1".to_owned())])
            .with_admin("root", "s2");

        assert!(provider.is_admin("root"));
        assert_eq!(provider.get_secret_key("root").unwrap(), "s2");
        assert_eq!(provider.len(), 2);
    }

    #[test]
    fn test_should_not_print_secrets_in_debug() {
        let provider = StaticCredentialProvider::default().with_admin("root", "topsecret");
        let debug = format!("{provider:?}");
        assert!(debug.contains("root"));
        assert!(!debug.contains("topsecret"));
    }
}
