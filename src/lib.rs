//! Opinject - resolve `op://` secret references into a job environment.
//!
//! Opinject reads secrets from 1Password through the `op` CLI and returns
//! them as environment variable overrides. It takes care of everything around
//! the CLI call: finding which variables are references, merging
//! configuration from the environment, build settings and pluggable
//! resolvers, and turning stored or raw tokens into credentials.
//!
//! # Features
//!
//! - **Reference discovery**: scan any environment map for `op://` values
//! - **Layered configuration**: job env, process env, system properties,
//!   build settings and resolver extensions with fixed precedence
//! - **Credential reuse**: raw tokens are matched against the credential
//!   store before a transient credential is synthesized
//! - **Environment hygiene**: injected host and token variables are removed
//!   once retrieval ends, whether it succeeded or not
//!
//! # Quick Start
//!
//! ```no_run
//! use opinject::credential::InMemoryCredentialStore;
//! use opinject::{Configuration, JobContext, SecretOrchestrator};
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> opinject::Result<()> {
//!     let orchestrator = SecretOrchestrator::new(Arc::new(InMemoryCredentialStore::new()));
//!     let job = JobContext::new("team/app", "/var/lib/ci/workspace/app");
//!
//!     let mut env = HashMap::new();
//!     env.insert("OP_SERVICE_ACCOUNT_TOKEN".to_string(), "ops_...".to_string());
//!     env.insert("DB_PASS".to_string(), "op://prod/db/password".to_string());
//!
//!     // Reads DB_PASS because its value is a reference.
//!     let overrides = orchestrator
//!         .load_secrets(&job, &mut std::io::stderr(), &env, None, Vec::new())
//!         .await?;
//!
//!     for (name, _) in &overrides {
//!         println!("injected {}", name);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! | Feature | Default | Provides |
//! |---------|---------|----------|
//! | `mock` | yes | [`credential::InMemoryCredentialStore`] |

pub mod cli;
pub mod config;
pub mod credential;
pub mod env;
pub mod error;
pub mod job;
pub mod merge;
pub mod orchestrator;
pub mod reference;

pub use config::Configuration;
pub use credential::{Credential, CredentialResolver, CredentialScope, CredentialStore, SecretValue};
pub use env::{EnvironmentProvider, StaticEnvironment, SystemEnvironment};
pub use error::{BackendMisconfiguration, OpInjectError, Result};
pub use job::JobContext;
pub use merge::{ConfigMerger, ConfigResolver, StaticConfigResolver};
pub use orchestrator::SecretOrchestrator;
pub use reference::{is_reference, ReferenceParts, SecretReference};
