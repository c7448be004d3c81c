//! Secure credential handling for backend adapters.
//!
//! Credentials are resolved once at start-up and wrapped so they cannot
//! leak through `Debug` or `Display`:
//!
//! - **No accidental logging**: Credentials print as `[REDACTED]`
//! - **Zeroed on drop**: Backed by `secrecy::SecretString`
//! - **Explicit exposure**: Only `.expose()` yields the raw value
//!
//! A missing credential is not an error here. The catalog keeps the entry
//! and dispatch skips it as unusable.
//!
//! ## Usage
//!
//! ```ignore
//! use crate::providers::secrets::ApiCredential;
//!
//! // Config value first, environment second
//! let cred = ApiCredential::resolve(None, "ANTHROPIC_API_KEY", "Anthropic API key");
//!
//! // Use in HTTP header (explicit exposure)
//! if let Some(cred) = &cred {
//!     request.header("x-api-key", cred.expose());
//! }
//! ```

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Where a credential was loaded from.
///
/// Useful for debugging configuration without exposing the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Loaded from the runtime configuration file
    Config,
    /// Loaded from environment variable
    Environment,
    /// Provided programmatically
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// A securely-stored API credential.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    /// Create a new credential from a string value.
    ///
    /// The value is immediately wrapped in `SecretString`.
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Load a credential from an environment variable.
    ///
    /// Unset and blank variables both yield `None`.
    pub fn from_env(env_var: &str, name: &'static str) -> Option<Self> {
        std::env::var(env_var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| Self::new(v, CredentialSource::Environment, name))
    }

    /// Resolve a credential from an explicit config value, falling back to
    /// an environment variable.
    pub fn resolve(configured: Option<&str>, env_var: &str, name: &'static str) -> Option<Self> {
        if let Some(value) = configured.filter(|v| !v.trim().is_empty()) {
            return Some(Self::new(value, CredentialSource::Config, name));
        }

        Self::from_env(env_var, name)
    }

    /// Expose the credential value for use in API calls.
    ///
    /// Only call this where the credential is sent (e.g., setting an HTTP
    /// header). Never store the exposed value.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    /// Check if the credential is empty.
    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    /// Get the source of this credential.
    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// Get the human-readable name of this credential.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_redacted_in_debug() {
        let secret = "sk-super-secret-key-12345";
        let cred = ApiCredential::new(secret, CredentialSource::Programmatic, "Test API key");

        let debug = format!("{:?}", cred);
        assert!(!debug.contains(secret), "Secret exposed in Debug!");
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_credential_redacted_in_display() {
        let secret = "sk-super-secret-key-12345";
        let cred = ApiCredential::new(secret, CredentialSource::Config, "Test API key");

        let display = format!("{}", cred);
        assert!(!display.contains(secret), "Secret exposed in Display!");
        assert!(display.contains("[REDACTED]"));
        assert!(display.contains("Test API key"));
        assert!(display.contains("config"));
    }

    #[test]
    fn test_credential_expose() {
        let secret = "sk-super-secret-key-12345";
        let cred = ApiCredential::new(secret, CredentialSource::Programmatic, "Test API key");
        assert_eq!(cred.expose(), secret);
    }

    #[test]
    fn test_resolve_prefers_config() {
        std::env::set_var("CLAIMWISE_TEST_KEY_PRIORITY", "env-key");
        let cred = ApiCredential::resolve(Some("config-key"), "CLAIMWISE_TEST_KEY_PRIORITY", "Test key")
            .unwrap();

        assert_eq!(cred.expose(), "config-key");
        assert_eq!(cred.source(), CredentialSource::Config);
        std::env::remove_var("CLAIMWISE_TEST_KEY_PRIORITY");
    }

    #[test]
    fn test_resolve_falls_back_to_env() {
        std::env::set_var("CLAIMWISE_TEST_KEY_FALLBACK", "env-key");
        let cred = ApiCredential::resolve(None, "CLAIMWISE_TEST_KEY_FALLBACK", "Test key").unwrap();

        assert_eq!(cred.expose(), "env-key");
        assert_eq!(cred.source(), CredentialSource::Environment);
        std::env::remove_var("CLAIMWISE_TEST_KEY_FALLBACK");
    }

    #[test]
    fn test_missing_and_blank_credentials_are_absent() {
        assert!(ApiCredential::resolve(None, "CLAIMWISE_NONEXISTENT_VAR_12345", "Test key").is_none());

        std::env::set_var("CLAIMWISE_TEST_KEY_BLANK", "  ");
        assert!(ApiCredential::from_env("CLAIMWISE_TEST_KEY_BLANK", "Test key").is_none());
        assert!(ApiCredential::resolve(Some(""), "CLAIMWISE_TEST_KEY_BLANK", "Test key").is_none());
        std::env::remove_var("CLAIMWISE_TEST_KEY_BLANK");
    }
}
