//! Credentials used to authenticate the CLI, and their resolution.
//!
//! Credentials come from two places: an external [`CredentialStore`] queried by
//! id, or raw tokens found in the environment. A raw token is matched against
//! the store first and only synthesized into an in-memory credential when no
//! stored credential carries it.

use crate::{JobContext, OpInjectError, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Well-known id of a Connect credential synthesized from a raw token.
pub const GENERATED_CONNECT_TOKEN_ID: &str = "onepassword_connect_token_autogenerated";

/// Well-known id of a service-account credential synthesized from a raw token.
pub const GENERATED_SERVICE_ACCOUNT_TOKEN_ID: &str =
    "onepassword_service_account_token_autogenerated";

/// Description of a synthesized Connect credential.
pub const GENERATED_CONNECT_DESCRIPTION: &str =
    "Auto-generated credential of the 1Password Connect Token from environment";

/// Description of a synthesized service-account credential.
pub const GENERATED_SERVICE_ACCOUNT_DESCRIPTION: &str =
    "Auto-generated credential of the 1Password Service Account Token from environment";

/// A secret string that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    /// Wraps a plaintext secret.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the plaintext.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(***)")
    }
}

impl From<&str> for SecretValue {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SecretValue {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Visibility of a credential in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialScope {
    /// Visible to every job
    #[default]
    Global,
    /// Visible to the controller only
    System,
}

/// A secret-text credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Store identifier
    pub id: String,
    /// The token
    pub secret: SecretValue,
    /// Human-readable description
    pub description: String,
    /// Store scope
    pub scope: CredentialScope,
}

impl Credential {
    /// Creates a credential.
    pub fn new(
        id: impl Into<String>,
        secret: impl Into<SecretValue>,
        description: impl Into<String>,
        scope: CredentialScope,
    ) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
            description: description.into(),
            scope,
        }
    }

    /// Creates an in-memory credential from a raw token.
    ///
    /// Synthesized credentials are global and are never written to a store.
    pub fn synthesized(
        id: impl Into<String>,
        description: impl Into<String>,
        token: impl Into<SecretValue>,
    ) -> Self {
        Self::new(id, token, description, CredentialScope::Global)
    }
}

/// External store of secret-text credentials.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use opinject::{Credential, CredentialStore, JobContext};
///
/// struct FixedStore(Vec<Credential>);
///
/// #[async_trait]
/// impl CredentialStore for FixedStore {
///     async fn lookup(&self, _job: &JobContext) -> opinject::Result<Vec<Credential>> {
///         Ok(self.0.clone())
///     }
/// }
/// ```
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Lists every secret-text credential visible to `job`.
    async fn lookup(&self, job: &JobContext) -> Result<Vec<Credential>>;

    /// Picks the first credential with the given id.
    fn find_by_id<'a>(&self, credentials: &'a [Credential], id: &str) -> Option<&'a Credential> {
        credentials.iter().find(|c| c.id == id)
    }
}

/// Resolves credentials by id or from raw tokens.
///
/// Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn CredentialStore>,
}

impl CredentialResolver {
    /// Creates a resolver backed by `store`.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Looks up a stored credential by id.
    ///
    /// Returns `Ok(None)` for a missing or blank id.
    ///
    /// # Errors
    ///
    /// Returns [`OpInjectError::CredentialUnavailable`] if an id was given but
    /// no stored credential has it. Store failures are propagated.
    pub async fn resolve(&self, job: &JobContext, id: Option<&str>) -> Result<Option<Credential>> {
        let id = match id {
            Some(id) if !id.trim().is_empty() => id,
            _ => return Ok(None),
        };

        let credentials = self.store.lookup(job).await?;
        match self.store.find_by_id(&credentials, id) {
            Some(credential) => {
                tracing::debug!(credential_id = id, "resolved stored credential");
                Ok(Some(credential.clone()))
            }
            None => Err(OpInjectError::CredentialUnavailable(id.to_string())),
        }
    }

    /// Turns a raw token into a credential.
    ///
    /// A stored credential whose secret or id equals the token is reused,
    /// the last one when several match. Otherwise a credential is
    /// synthesized with `well_known_id` and `description`.
    pub async fn resolve_from_raw_token(
        &self,
        job: &JobContext,
        token: &str,
        well_known_id: &str,
        description: &str,
    ) -> Result<Credential> {
        let credentials = self.store.lookup(job).await?;

        if let Some(stored) = credentials
            .iter()
            .rev()
            .find(|c| c.secret.expose() == token || c.id == token)
        {
            tracing::debug!(credential_id = %stored.id, "raw token matches stored credential");
            return Ok(stored.clone());
        }

        tracing::debug!(credential_id = well_known_id, "synthesizing credential from raw token");
        Ok(Credential::synthesized(well_known_id, description, token))
    }
}

/// In-memory credential store for testing.
///
/// # Example
///
/// ```
/// use opinject::credential::InMemoryCredentialStore;
/// use opinject::{Credential, CredentialScope};
///
/// let store = InMemoryCredentialStore::new()
///     .with_credential(Credential::new("connect", "tok", "Connect token", CredentialScope::Global));
/// assert_eq!(store.len(), 1);
/// ```
#[cfg(feature = "mock")]
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    credentials: Vec<Credential>,
    /// Error message returned from every `lookup()` when set
    pub lookup_error: Option<String>,
}

#[cfg(feature = "mock")]
impl InMemoryCredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a credential.
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credentials.push(credential);
        self
    }

    /// Number of stored credentials.
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

#[cfg(feature = "mock")]
#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn lookup(&self, _job: &JobContext) -> Result<Vec<Credential>> {
        if let Some(ref msg) = self.lookup_error {
            return Err(OpInjectError::Other(anyhow::anyhow!("{}", msg)));
        }
        Ok(self.credentials.clone())
    }
}
