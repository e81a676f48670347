//! Error types for secret resolution.

use thiserror::Error;

/// Result type alias using [`OpInjectError`].
pub type Result<T> = std::result::Result<T, OpInjectError>;

/// Errors that can occur while resolving and retrieving secrets.
///
/// None of these are retried internally. The first error aborts the whole
/// retrieval and no partially computed overrides are returned.
#[derive(Debug, Error)]
pub enum OpInjectError {
    /// No source produced any configuration.
    #[error("No config found - please configure 1Password")]
    NoConfigurationFound,

    /// A credential id was configured but the store has no such credential.
    #[error("credential unavailable: {0}")]
    CredentialUnavailable(String),

    /// Host and credential material do not form a usable combination.
    #[error("{0}")]
    MisconfiguredBackend(#[from] BackendMisconfiguration),

    /// The CLI printed neither a value nor a diagnostic.
    #[error("Secret with reference {reference} is empty.")]
    EmptySecret {
        /// Reference that was read
        reference: String,
    },

    /// The CLI printed no value but reported a diagnostic.
    #[error("Error retrieving secret {reference}:\n{stderr}")]
    SecretRetrievalFailed {
        /// Reference that was read
        reference: String,
        /// Standard error of the CLI, verbatim
        stderr: String,
    },

    /// The CLI could not be started or its output could not be read.
    #[error("Error running command {command}:\n{message}")]
    ProcessLaunchFailed {
        /// Command line that was attempted
        command: String,
        /// Underlying I/O error text
        message: String,
    },

    /// A declared secret does not follow the `op://` reference grammar.
    #[error("invalid secret reference: {0}")]
    InvalidReference(String),

    /// Failure reported by an external collaborator (credential store, resolver).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The three ways host and credential material can be misconfigured.
///
/// Only checked when no service-account credential is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BackendMisconfiguration {
    /// Connect credential present, host missing.
    #[error("The Connect host is not configured - please provide the host to the Connect instance.")]
    MissingHost,

    /// Host present, Connect credential missing.
    #[error("The Connect credential is not configured - please provide the credential of the Connect instance.")]
    MissingConnectCredential,

    /// Neither Connect nor service-account material present.
    #[error("No credential has been configured - please provide either the credential and host of the Connect instance or the credential of the Service Account Token.")]
    NothingConfigured,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OpInjectError::CredentialUnavailable("connect-token".to_string());
        assert_eq!(err.to_string(), "credential unavailable: connect-token");
    }

    #[test]
    fn test_retrieval_failure_carries_reference_and_stderr() {
        let err = OpInjectError::SecretRetrievalFailed {
            reference: "op://vault/item/field".to_string(),
            stderr: "access denied\n".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("op://vault/item/field"));
        assert!(msg.contains("access denied"));
    }

    #[test]
    fn test_misconfiguration_messages_are_distinct() {
        let host = OpInjectError::from(BackendMisconfiguration::MissingHost).to_string();
        let cred = OpInjectError::from(BackendMisconfiguration::MissingConnectCredential).to_string();
        let none = OpInjectError::from(BackendMisconfiguration::NothingConfigured).to_string();

        assert!(host.contains("Connect host is not configured"));
        assert!(cred.contains("Connect credential is not configured"));
        assert!(none.contains("No credential has been configured"));
    }

    #[test]
    fn test_other_is_transparent() {
        let err = OpInjectError::from(anyhow::anyhow!("store offline"));
        assert_eq!(err.to_string(), "store offline");
    }
}
