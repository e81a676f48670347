//! Merging of configuration sources into one effective [`Configuration`].
//!
//! Precedence, highest first:
//!
//! 1. non-blank build-level host and credential ids
//! 2. values read from the job environment, process environment and system
//!    properties
//! 3. fragments from registered [`ConfigResolver`]s, in registration order
//!
//! Resolvers only fill fields nothing earlier has set, so the first
//! registered resolver wins over later ones.

use crate::credential::{
    GENERATED_CONNECT_DESCRIPTION, GENERATED_CONNECT_TOKEN_ID,
    GENERATED_SERVICE_ACCOUNT_DESCRIPTION, GENERATED_SERVICE_ACCOUNT_TOKEN_ID,
};
use crate::env::{self, EnvironmentProvider};
use crate::{Configuration, CredentialResolver, JobContext, OpInjectError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Extension contributing configuration for a job, such as folder-level
/// or controller-wide settings.
#[async_trait]
pub trait ConfigResolver: Send + Sync {
    /// Returns this resolver's configuration for `job`, if it has any.
    async fn for_job(&self, job: &JobContext) -> Result<Option<Configuration>>;
}

/// Resolver that returns the same configuration for every job.
#[derive(Debug, Clone)]
pub struct StaticConfigResolver {
    config: Configuration,
}

impl StaticConfigResolver {
    /// Creates a resolver that always contributes `config`.
    pub fn new(config: Configuration) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConfigResolver for StaticConfigResolver {
    async fn for_job(&self, _job: &JobContext) -> Result<Option<Configuration>> {
        Ok(Some(self.config.clone()))
    }
}

/// Combines every configuration source for one retrieval.
#[derive(Clone)]
pub struct ConfigMerger {
    environment: Arc<dyn EnvironmentProvider>,
    credentials: CredentialResolver,
    resolvers: Vec<Arc<dyn ConfigResolver>>,
}

impl ConfigMerger {
    /// Creates a merger with no registered resolvers.
    pub fn new(environment: Arc<dyn EnvironmentProvider>, credentials: CredentialResolver) -> Self {
        Self {
            environment,
            credentials,
            resolvers: Vec::new(),
        }
    }

    /// Registers a resolver after all previously registered ones.
    pub fn register(&mut self, resolver: Arc<dyn ConfigResolver>) {
        self.resolvers.push(resolver);
    }

    /// Builds the effective configuration.
    ///
    /// # Errors
    ///
    /// Returns [`OpInjectError::NoConfigurationFound`] when no source yields
    /// anything. Credential store and resolver failures are propagated.
    pub async fn merge(
        &self,
        job: &JobContext,
        build_config: Option<&Configuration>,
        job_env: &HashMap<String, String>,
    ) -> Result<Configuration> {
        let mut config = match self.resolve_from_env(job, job_env).await? {
            None => {
                tracing::debug!("no configuration in environment, using build configuration");
                build_config.cloned()
            }
            Some(mut env_config) => {
                if let Some(build) = build_config {
                    apply_build_overrides(&mut env_config, build);
                }
                Some(env_config)
            }
        };

        for resolver in &self.resolvers {
            let fragment = resolver.for_job(job).await?;
            config = match config {
                Some(current) => Some(current.merge_with_parent(fragment)),
                None => fragment,
            };
        }

        config.ok_or(OpInjectError::NoConfigurationFound)
    }

    /// Reads configuration from the environment channels.
    ///
    /// Returns `Ok(None)` when none of the four channels is present. Raw
    /// tokens are turned into credentials, reusing stored ones when possible.
    pub async fn resolve_from_env(
        &self,
        job: &JobContext,
        job_env: &HashMap<String, String>,
    ) -> Result<Option<Configuration>> {
        let provider = &self.environment;
        let connect_host = provider.read_channel(env::CONNECT_HOST, job_env);
        let connect_token = provider.read_channel(env::CONNECT_TOKEN, job_env);
        let service_account_token = provider.read_channel(env::SERVICE_ACCOUNT_TOKEN, job_env);
        let cli_path = provider.read_channel(env::CLI_PATH, job_env);

        if connect_host.is_none()
            && connect_token.is_none()
            && service_account_token.is_none()
            && cli_path.is_none()
        {
            return Ok(None);
        }

        let mut config = Configuration::new();
        if let Some(host) = connect_host {
            config = config.with_connect_host(host);
        }
        if let Some(path) = cli_path {
            config = config.with_cli_path(path);
        }
        if let Some(token) = connect_token {
            let credential = self
                .credentials
                .resolve_from_raw_token(
                    job,
                    &token,
                    GENERATED_CONNECT_TOKEN_ID,
                    GENERATED_CONNECT_DESCRIPTION,
                )
                .await?;
            config = config.with_connect_credential(credential);
        }
        if let Some(token) = service_account_token {
            let credential = self
                .credentials
                .resolve_from_raw_token(
                    job,
                    &token,
                    GENERATED_SERVICE_ACCOUNT_TOKEN_ID,
                    GENERATED_SERVICE_ACCOUNT_DESCRIPTION,
                )
                .await?;
            config = config.with_service_account_credential(credential);
        }

        tracing::debug!(job = job.parent_job(), "configuration read from environment");
        Ok(Some(config))
    }
}

fn apply_build_overrides(config: &mut Configuration, build: &Configuration) {
    if config.override_connect_host(build.connect_host()) {
        tracing::debug!("build configuration overrides connect host");
    }
    if config.override_connect_credential_id(build.connect_credential_id()) {
        tracing::debug!("build configuration overrides connect credential");
    }
    if config.override_service_account_credential_id(build.service_account_credential_id()) {
        tracing::debug!("build configuration overrides service account credential");
    }
}
