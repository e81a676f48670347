//! Detection and validation of `op://` secret references.

use crate::{OpInjectError, Result};
use serde::{Deserialize, Serialize};

/// Scheme prefix of every secret reference.
pub const REFERENCE_PREFIX: &str = "op://";

/// Returns true if `value` is a secret reference.
///
/// A reference is `op://<vault>/<item>/[<section>/]<field>`: three or four
/// non-empty `/`-separated segments after the prefix.
///
/// # Example
///
/// ```
/// use opinject::is_reference;
///
/// assert!(is_reference("op://vault/item/field"));
/// assert!(is_reference("op://vault/item/section/field"));
/// assert!(!is_reference("op://vault/item"));
/// assert!(!is_reference("op://vault/item//field"));
/// assert!(!is_reference("http://vault/item/field"));
/// ```
pub fn is_reference(value: &str) -> bool {
    ReferenceParts::parse(value).is_some()
}

/// The path segments of a secret reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceParts<'a> {
    /// Vault name or id
    pub vault: &'a str,
    /// Item name or id
    pub item: &'a str,
    /// Optional section
    pub section: Option<&'a str>,
    /// Field label
    pub field: &'a str,
}

impl<'a> ReferenceParts<'a> {
    /// Splits a reference into its segments, or `None` if it is not one.
    pub fn parse(value: &'a str) -> Option<Self> {
        let path = value.strip_prefix(REFERENCE_PREFIX)?;
        let segments: Vec<&str> = path.split('/').collect();

        if segments.iter().any(|s| s.is_empty()) {
            return None;
        }

        match *segments.as_slice() {
            [vault, item, field] => Some(Self {
                vault,
                item,
                section: None,
                field,
            }),
            [vault, item, section, field] => Some(Self {
                vault,
                item,
                section: Some(section),
                field,
            }),
            _ => None,
        }
    }
}

/// A secret to inject: the environment variable and the reference it reads.
///
/// Construction validates the reference, so every value of this type is
/// readable by the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSecretReference", into = "RawSecretReference")]
pub struct SecretReference {
    env_var: String,
    reference: String,
}

impl SecretReference {
    /// Creates a secret declaration.
    ///
    /// # Errors
    ///
    /// Returns [`OpInjectError::InvalidReference`] if the variable name is
    /// blank or the reference does not follow the `op://` grammar.
    pub fn new(env_var: impl Into<String>, reference: impl Into<String>) -> Result<Self> {
        let env_var = env_var.into();
        let reference = reference.into();

        if env_var.trim().is_empty() {
            return Err(OpInjectError::InvalidReference(format!(
                "{} has no environment variable name",
                reference
            )));
        }
        if !is_reference(&reference) {
            return Err(OpInjectError::InvalidReference(reference));
        }

        Ok(Self { env_var, reference })
    }

    /// Environment variable that receives the secret value.
    pub fn env_var(&self) -> &str {
        &self.env_var
    }

    /// The `op://` reference.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Path segments of the reference.
    pub fn parts(&self) -> ReferenceParts<'_> {
        // Validated on construction.
        ReferenceParts::parse(&self.reference).unwrap_or(ReferenceParts {
            vault: "",
            item: "",
            section: None,
            field: "",
        })
    }
}

/// Wire form of a declared secret, as written in job settings.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSecretReference {
    env_var: String,
    secret_ref: String,
}

impl TryFrom<RawSecretReference> for SecretReference {
    type Error = OpInjectError;

    fn try_from(raw: RawSecretReference) -> Result<Self> {
        Self::new(raw.env_var, raw.secret_ref)
    }
}

impl From<SecretReference> for RawSecretReference {
    fn from(secret: SecretReference) -> Self {
        Self {
            env_var: secret.env_var,
            secret_ref: secret.reference,
        }
    }
}
