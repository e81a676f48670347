//! Effective configuration of one retrieval.

use crate::Credential;
use serde::{Deserialize, Serialize};

/// Connection settings for the `op` CLI.
///
/// Every field is optional: `None` means "not set by this source" and
/// `Some("")` means "explicitly set to empty". Merging only ever fills `None`
/// fields, so the difference matters.
///
/// Credential objects are never serialized; only their ids are.
///
/// ```
/// use opinject::Configuration;
///
/// let config = Configuration::new()
///     .with_connect_host("https://connect.example.com")
///     .with_connect_credential_id("connect-token");
///
/// assert_eq!(config.connect_host(), Some("https://connect.example.com"));
/// assert!(config.service_account_credential_id().is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    connect_host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    connect_credential_id: Option<String>,

    #[serde(skip)]
    connect_credential: Option<Credential>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    service_account_credential_id: Option<String>,

    #[serde(skip)]
    service_account_credential: Option<Credential>,

    #[serde(default, rename = "opCLIPath", skip_serializing_if = "Option::is_none")]
    cli_path: Option<String>,
}

impl Configuration {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the Connect host URL.
    pub fn with_connect_host(mut self, host: impl Into<String>) -> Self {
        self.connect_host = Some(host.into());
        self
    }

    /// Sets the id of the stored Connect credential.
    pub fn with_connect_credential_id(mut self, id: impl Into<String>) -> Self {
        self.connect_credential_id = Some(id.into());
        self
    }

    /// Attaches an already resolved Connect credential and records its id.
    pub fn with_connect_credential(mut self, credential: Credential) -> Self {
        self.connect_credential_id = Some(credential.id.clone());
        self.connect_credential = Some(credential);
        self
    }

    /// Sets the id of the stored service-account credential.
    pub fn with_service_account_credential_id(mut self, id: impl Into<String>) -> Self {
        self.service_account_credential_id = Some(id.into());
        self
    }

    /// Attaches an already resolved service-account credential and records its id.
    pub fn with_service_account_credential(mut self, credential: Credential) -> Self {
        self.service_account_credential_id = Some(credential.id.clone());
        self.service_account_credential = Some(credential);
        self
    }

    /// Sets the directory (or `.exe` path) of the `op` CLI.
    pub fn with_cli_path(mut self, path: impl Into<String>) -> Self {
        self.cli_path = Some(path.into());
        self
    }

    /// Connect host, if set.
    pub fn connect_host(&self) -> Option<&str> {
        self.connect_host.as_deref()
    }

    /// Stored Connect credential id, if set.
    pub fn connect_credential_id(&self) -> Option<&str> {
        self.connect_credential_id.as_deref()
    }

    /// Resolved Connect credential, if attached.
    pub fn connect_credential(&self) -> Option<&Credential> {
        self.connect_credential.as_ref()
    }

    /// Stored service-account credential id, if set.
    pub fn service_account_credential_id(&self) -> Option<&str> {
        self.service_account_credential_id.as_deref()
    }

    /// Resolved service-account credential, if attached.
    pub fn service_account_credential(&self) -> Option<&Credential> {
        self.service_account_credential.as_ref()
    }

    /// CLI location, if set.
    pub fn cli_path(&self) -> Option<&str> {
        self.cli_path.as_deref()
    }

    /// Whether any field is set.
    pub fn has_any(&self) -> bool {
        self.connect_host.is_some()
            || self.connect_credential_id.is_some()
            || self.connect_credential.is_some()
            || self.service_account_credential_id.is_some()
            || self.service_account_credential.is_some()
            || self.cli_path.is_some()
    }

    /// Overrides the Connect host with a non-blank value.
    ///
    /// Returns whether the override applied.
    pub(crate) fn override_connect_host(&mut self, host: Option<&str>) -> bool {
        match non_blank(host) {
            Some(host) => {
                self.connect_host = Some(host.to_string());
                true
            }
            None => false,
        }
    }

    /// Overrides the Connect credential id with a non-blank value and drops
    /// any attached credential so it is looked up again by the new id.
    pub(crate) fn override_connect_credential_id(&mut self, id: Option<&str>) -> bool {
        match non_blank(id) {
            Some(id) => {
                self.connect_credential_id = Some(id.to_string());
                self.connect_credential = None;
                true
            }
            None => false,
        }
    }

    /// Same as [`override_connect_credential_id`](Self::override_connect_credential_id)
    /// for the service-account credential.
    pub(crate) fn override_service_account_credential_id(&mut self, id: Option<&str>) -> bool {
        match non_blank(id) {
            Some(id) => {
                self.service_account_credential_id = Some(id.to_string());
                self.service_account_credential = None;
                true
            }
            None => false,
        }
    }

    /// Fills every unset field from `parent`.
    ///
    /// Fields already set on `self`, including explicitly empty ones, win.
    /// A credential id and its resolved credential travel together: they are
    /// taken from the parent only when `self` has neither.
    pub fn merge_with_parent(mut self, parent: Option<Configuration>) -> Self {
        let Some(parent) = parent else {
            return self;
        };

        if self.connect_host.is_none() {
            self.connect_host = parent.connect_host;
        }
        if self.connect_credential_id.is_none() && self.connect_credential.is_none() {
            self.connect_credential_id = parent.connect_credential_id;
            self.connect_credential = parent.connect_credential;
        }
        if self.service_account_credential_id.is_none() && self.service_account_credential.is_none() {
            self.service_account_credential_id = parent.service_account_credential_id;
            self.service_account_credential = parent.service_account_credential;
        }
        if self.cli_path.is_none() {
            self.cli_path = parent.cli_path;
        }

        self
    }
}

/// Returns the value if it is present and not blank.
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
