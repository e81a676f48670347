//! Retrieval of declared and discovered secrets through the CLI.

use crate::cli::{run_read, CliLocation, LaunchEnvironment};
use crate::config::non_blank;
use crate::env::{
    EnvironmentProvider, SystemEnvironment, ENV_CONNECT_HOST, ENV_CONNECT_TOKEN,
    ENV_SERVICE_ACCOUNT_TOKEN,
};
use crate::merge::{ConfigMerger, ConfigResolver};
use crate::{
    is_reference, BackendMisconfiguration, Configuration, Credential, CredentialResolver,
    CredentialStore, JobContext, OpInjectError, Result, SecretReference,
};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// Job environment key holding the workspace directory.
pub const ENV_WORKSPACE: &str = "WORKSPACE";

/// Resolves configuration and credentials, then reads each secret with one
/// `op read` invocation.
///
/// Secrets are read one at a time in declaration order. The first failure
/// aborts the retrieval and nothing read before it is returned.
///
/// # Example
///
/// ```no_run
/// use opinject::credential::InMemoryCredentialStore;
/// use opinject::{Configuration, JobContext, SecretOrchestrator, SecretReference};
/// use std::collections::HashMap;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> opinject::Result<()> {
///     let orchestrator = SecretOrchestrator::new(Arc::new(InMemoryCredentialStore::new()));
///     let job = JobContext::new("team/app", "/var/lib/ci/workspace/app");
///     let config = Configuration::new().with_service_account_credential_id("op-sa-token");
///     let secrets = vec![SecretReference::new("DB_PASS", "op://prod/db/password")?];
///
///     let overrides = orchestrator
///         .retrieve_secrets(&job, &mut std::io::stdout(), &HashMap::new(), Some(&config), &secrets)
///         .await?;
///     println!("{} secrets injected", overrides.len());
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct SecretOrchestrator {
    merger: ConfigMerger,
    credentials: CredentialResolver,
    environment: Arc<dyn EnvironmentProvider>,
}

impl SecretOrchestrator {
    /// Creates an orchestrator reading the real process environment.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self::with_environment(store, Arc::new(SystemEnvironment::new()))
    }

    /// Creates an orchestrator with an explicit environment provider.
    pub fn with_environment(
        store: Arc<dyn CredentialStore>,
        environment: Arc<dyn EnvironmentProvider>,
    ) -> Self {
        let credentials = CredentialResolver::new(store);
        Self {
            merger: ConfigMerger::new(environment.clone(), credentials.clone()),
            credentials,
            environment,
        }
    }

    /// Registers a configuration resolver after all previously registered ones.
    pub fn register_resolver(&mut self, resolver: Arc<dyn ConfigResolver>) {
        self.merger.register(resolver);
    }

    /// Reads every declared secret.
    ///
    /// Returns a map from environment variable name to secret value.
    ///
    /// # Errors
    ///
    /// - [`OpInjectError::NoConfigurationFound`]: nothing configured anywhere
    /// - [`OpInjectError::CredentialUnavailable`]: a configured credential id is unknown
    /// - [`OpInjectError::MisconfiguredBackend`]: host and credentials do not fit together
    /// - [`OpInjectError::EmptySecret`], [`OpInjectError::SecretRetrievalFailed`],
    ///   [`OpInjectError::ProcessLaunchFailed`]: reading a secret failed
    pub async fn retrieve_secrets(
        &self,
        job: &JobContext,
        log: &mut (dyn Write + Send),
        environment: &HashMap<String, String>,
        build_config: Option<&Configuration>,
        secrets: &[SecretReference],
    ) -> Result<HashMap<String, String>> {
        let (location, mut launch_env) = self.prepare(job, environment, build_config).await?;
        read_secrets(&location, &mut launch_env, log, secrets).await
    }

    /// Like [`retrieve_secrets`](Self::retrieve_secrets), but also reads every
    /// environment entry whose value is a secret reference.
    ///
    /// Discovered entries follow the declared ones, ordered by variable name.
    /// Variables that are already declared are not added twice.
    pub async fn load_secrets(
        &self,
        job: &JobContext,
        log: &mut (dyn Write + Send),
        environment: &HashMap<String, String>,
        build_config: Option<&Configuration>,
        secrets: Vec<SecretReference>,
    ) -> Result<HashMap<String, String>> {
        let secrets = discover_secrets(secrets, environment);
        self.retrieve_secrets(job, log, environment, build_config, &secrets)
            .await
    }

    /// Merges configuration, resolves credentials, validates them and builds
    /// the CLI location and launch environment.
    async fn prepare(
        &self,
        job: &JobContext,
        environment: &HashMap<String, String>,
        build_config: Option<&Configuration>,
    ) -> Result<(CliLocation, LaunchEnvironment)> {
        let config = self.merger.merge(job, build_config, environment).await?;
        let connect_host = non_blank(config.connect_host());

        let connect_credential = match config.connect_credential() {
            Some(credential) => Some(credential.clone()),
            None => {
                self.credentials
                    .resolve(job, config.connect_credential_id())
                    .await?
            }
        };
        let service_account_credential = match config.service_account_credential() {
            Some(credential) => Some(credential.clone()),
            None => {
                self.credentials
                    .resolve(job, config.service_account_credential_id())
                    .await?
            }
        };

        validate_backend(
            connect_host,
            connect_credential.as_ref(),
            service_account_credential.as_ref(),
        )?;

        let location = CliLocation::resolve(cli_directory(&config, environment, job));

        let mut launch_env = LaunchEnvironment::new(self.environment.vars());
        if let Some(host) = connect_host {
            launch_env.put_if_absent(ENV_CONNECT_HOST, host);
        }
        if let Some(ref credential) = connect_credential {
            launch_env.put_if_absent(ENV_CONNECT_TOKEN, credential.secret.expose());
        }
        if let Some(ref credential) = service_account_credential {
            launch_env.put_if_absent(ENV_SERVICE_ACCOUNT_TOKEN, credential.secret.expose());
        }
        launch_env.set_integration_identity();

        tracing::debug!(
            executable = %location.executable.display(),
            connect = connect_credential.is_some(),
            service_account = service_account_credential.is_some(),
            "prepared CLI invocation"
        );

        Ok((location, launch_env))
    }
}

/// Checks that the credentials can authenticate the CLI.
///
/// A service-account credential is sufficient on its own. Without one, a
/// Connect host and a Connect credential are both required.
pub fn validate_backend(
    connect_host: Option<&str>,
    connect_credential: Option<&Credential>,
    service_account_credential: Option<&Credential>,
) -> std::result::Result<(), BackendMisconfiguration> {
    if service_account_credential.is_some() {
        return Ok(());
    }

    let has_host = non_blank(connect_host).is_some();
    match (has_host, connect_credential.is_some()) {
        (true, true) => Ok(()),
        (false, true) => Err(BackendMisconfiguration::MissingHost),
        (true, false) => Err(BackendMisconfiguration::MissingConnectCredential),
        (false, false) => Err(BackendMisconfiguration::NothingConfigured),
    }
}

/// Appends environment entries holding references that are not declared yet.
fn discover_secrets(
    mut secrets: Vec<SecretReference>,
    environment: &HashMap<String, String>,
) -> Vec<SecretReference> {
    let declared: HashSet<String> = secrets.iter().map(|s| s.env_var().to_string()).collect();

    let mut discovered: Vec<SecretReference> = environment
        .iter()
        .filter(|(key, value)| is_reference(value) && !declared.contains(key.as_str()))
        .filter_map(|(key, value)| SecretReference::new(key.as_str(), value.as_str()).ok())
        .collect();
    discovered.sort_by(|a, b| a.env_var().cmp(b.env_var()));

    if !discovered.is_empty() {
        tracing::debug!(count = discovered.len(), "discovered secret references in environment");
    }

    secrets.extend(discovered);
    secrets
}

/// Directory (or `.exe` path) of the CLI: configured path, then the job's
/// `WORKSPACE`, then the job context workspace.
fn cli_directory(
    config: &Configuration,
    environment: &HashMap<String, String>,
    job: &JobContext,
) -> PathBuf {
    non_blank(config.cli_path())
        .or_else(|| non_blank(environment.get(ENV_WORKSPACE).map(String::as_str)))
        .map(PathBuf::from)
        .unwrap_or_else(|| job.workspace().to_path_buf())
}

/// Reads every secret, then scrubs the auth variables from `launch_env`
/// whether or not reading succeeded.
async fn read_secrets(
    location: &CliLocation,
    launch_env: &mut LaunchEnvironment,
    log: &mut (dyn Write + Send),
    secrets: &[SecretReference],
) -> Result<HashMap<String, String>> {
    let result = read_each(location, launch_env, log, secrets).await;
    launch_env.scrub_credentials();
    result
}

async fn read_each(
    location: &CliLocation,
    launch_env: &LaunchEnvironment,
    log: &mut (dyn Write + Send),
    secrets: &[SecretReference],
) -> Result<HashMap<String, String>> {
    let mut overrides = HashMap::with_capacity(secrets.len());

    for secret in secrets {
        // A broken log sink must not fail the retrieval.
        if let Err(e) = writeln!(log, "Retrieving secret {}", secret.env_var()) {
            tracing::warn!(error = %e, "failed to write to build log");
        }
        let parts = secret.parts();
        tracing::info!(
            env_var = secret.env_var(),
            vault = parts.vault,
            item = parts.item,
            "retrieving secret"
        );

        let output = run_read(location, secret.reference(), launch_env).await?;
        let value = output.stdout.trim();

        if value.is_empty() {
            if output.stderr.trim().is_empty() {
                return Err(OpInjectError::EmptySecret {
                    reference: secret.reference().to_string(),
                });
            }
            tracing::warn!(env_var = secret.env_var(), status = ?output.status, "CLI reported an error");
            return Err(OpInjectError::SecretRetrievalFailed {
                reference: secret.reference().to_string(),
                stderr: output.stderr,
            });
        }

        overrides.insert(secret.env_var().to_string(), value.to_string());
    }

    Ok(overrides)
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::credential::InMemoryCredentialStore;
    use crate::env::StaticEnvironment;
    use crate::CredentialScope;

    fn cred(id: &str, secret: &str) -> Credential {
        Credential::new(id, secret, "", CredentialScope::Global)
    }

    fn secret(env_var: &str, reference: &str) -> SecretReference {
        SecretReference::new(env_var, reference).unwrap()
    }

    #[test]
    fn test_validate_backend() {
        let c = cred("c", "t");

        assert!(validate_backend(None, None, Some(&c)).is_ok());
        assert!(validate_backend(Some("https://h"), Some(&c), None).is_ok());
        assert_eq!(
            validate_backend(Some("https://h"), None, None),
            Err(BackendMisconfiguration::MissingConnectCredential)
        );
        assert_eq!(
            validate_backend(Some(" "), Some(&c), None),
            Err(BackendMisconfiguration::MissingHost)
        );
        assert_eq!(
            validate_backend(None, None, None),
            Err(BackendMisconfiguration::NothingConfigured)
        );
    }

    #[test]
    fn test_discover_skips_declared_and_plain_values() {
        let mut env = HashMap::new();
        env.insert("FOO".to_string(), "op://v/i/f".to_string());
        env.insert("BAR".to_string(), "plain".to_string());
        env.insert("BAZ".to_string(), "op://v/i/s/f".to_string());
        env.insert("ALPHA".to_string(), "op://v/i/x".to_string());

        let secrets = discover_secrets(vec![secret("FOO", "op://v/i/declared")], &env);
        let names: Vec<&str> = secrets.iter().map(|s| s.env_var()).collect();

        assert_eq!(names, vec!["FOO", "ALPHA", "BAZ"]);
        assert_eq!(secrets[0].reference(), "op://v/i/declared");
    }

    #[test]
    fn test_cli_directory_fallbacks() {
        let job = JobContext::new("job", "/ws/job");
        let mut env = HashMap::new();

        let config = Configuration::new().with_cli_path("");
        assert_eq!(cli_directory(&config, &env, &job), PathBuf::from("/ws/job"));

        env.insert(ENV_WORKSPACE.to_string(), "/ws/from-env".to_string());
        assert_eq!(cli_directory(&config, &env, &job), PathBuf::from("/ws/from-env"));

        let config = Configuration::new().with_cli_path("/opt/op");
        assert_eq!(cli_directory(&config, &env, &job), PathBuf::from("/opt/op"));
    }

    #[tokio::test]
    async fn test_misconfiguration_fails_before_launch() {
        let orchestrator = SecretOrchestrator::with_environment(
            Arc::new(InMemoryCredentialStore::new()),
            Arc::new(StaticEnvironment::new()),
        );
        let job = JobContext::new("job", "/nonexistent");
        let config = Configuration::new().with_connect_host("https://connect");

        let err = orchestrator
            .retrieve_secrets(
                &job,
                &mut Vec::<u8>::new(),
                &HashMap::new(),
                Some(&config),
                &[secret("A", "op://v/i/f")],
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OpInjectError::MisconfiguredBackend(BackendMisconfiguration::MissingConnectCredential)
        ));
    }

    #[tokio::test]
    async fn test_unknown_credential_id_fails() {
        let orchestrator = SecretOrchestrator::with_environment(
            Arc::new(InMemoryCredentialStore::new()),
            Arc::new(StaticEnvironment::new()),
        );
        let job = JobContext::new("job", "/nonexistent");
        let config = Configuration::new().with_service_account_credential_id("missing");

        let err = orchestrator
            .retrieve_secrets(&job, &mut Vec::<u8>::new(), &HashMap::new(), Some(&config), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, OpInjectError::CredentialUnavailable(ref id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_prepare_injects_without_clobbering() {
        let store = InMemoryCredentialStore::new().with_credential(cred("connect", "stored-token"));
        let provider = StaticEnvironment::new()
            .with_var("PATH", "/usr/bin")
            .with_var(ENV_CONNECT_TOKEN, "operator-token");
        let orchestrator = SecretOrchestrator::with_environment(Arc::new(store), Arc::new(provider));
        let job = JobContext::new("job", "/ws");
        let config = Configuration::new()
            .with_connect_host("https://connect")
            .with_connect_credential_id("connect");

        let (location, launch_env) = orchestrator
            .prepare(&job, &HashMap::new(), Some(&config))
            .await
            .unwrap();

        assert_eq!(location.executable, PathBuf::from("/ws/op"));
        assert_eq!(launch_env.get("PATH"), Some("/usr/bin"));
        assert_eq!(launch_env.get(ENV_CONNECT_TOKEN), Some("operator-token"));
        assert_eq!(launch_env.get(ENV_CONNECT_HOST), Some("https://connect"));
        assert_eq!(launch_env.get(crate::cli::ENV_INTEGRATION_NAME), Some(crate::cli::INTEGRATION_NAME));
    }

    #[cfg(unix)]
    fn stub_cli(dir: &std::path::Path, body: &str) {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join(crate::cli::EXECUTABLE_NAME);
        std::fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    fn injected_env() -> LaunchEnvironment {
        let mut env = LaunchEnvironment::default();
        env.put_if_absent(ENV_CONNECT_HOST, "https://connect");
        env.put_if_absent(ENV_CONNECT_TOKEN, "token");
        env.put_if_absent(ENV_SERVICE_ACCOUNT_TOKEN, "sa");
        env.set_integration_identity();
        env
    }

    #[cfg(unix)]
    fn assert_scrubbed(env: &LaunchEnvironment) {
        assert!(env.get(ENV_CONNECT_HOST).is_none());
        assert!(env.get(ENV_CONNECT_TOKEN).is_none());
        assert!(env.get(ENV_SERVICE_ACCOUNT_TOKEN).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_secrets_scrubs_after_success() {
        let dir = tempfile::tempdir().unwrap();
        stub_cli(dir.path(), "echo \"  value-for-$2  \"");
        let location = CliLocation::resolve(dir.path());
        let mut env = injected_env();
        let mut log: Vec<u8> = Vec::new();

        let overrides = read_secrets(
            &location,
            &mut env,
            &mut log,
            &[secret("A", "op://v/i/a"), secret("B", "op://v/i/b")],
        )
        .await
        .unwrap();

        assert_eq!(overrides.get("A").map(String::as_str), Some("value-for-op://v/i/a"));
        assert_eq!(overrides.get("B").map(String::as_str), Some("value-for-op://v/i/b"));
        assert_eq!(
            String::from_utf8(log).unwrap(),
            "Retrieving secret A\nRetrieving secret B\n"
        );
        assert_scrubbed(&env);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_secrets_scrubs_after_failure_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        stub_cli(
            dir.path(),
            "case \"$2\" in op://v/i/bad) echo 'access denied' >&2 ;; *) echo ok ;; esac",
        );
        let location = CliLocation::resolve(dir.path());
        let mut env = injected_env();
        let mut log: Vec<u8> = Vec::new();

        let err = read_secrets(
            &location,
            &mut env,
            &mut log,
            &[
                secret("A", "op://v/i/a"),
                secret("BAD", "op://v/i/bad"),
                secret("C", "op://v/i/c"),
            ],
        )
        .await
        .unwrap_err();

        match err {
            OpInjectError::SecretRetrievalFailed { reference, stderr } => {
                assert_eq!(reference, "op://v/i/bad");
                assert!(stderr.contains("access denied"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!String::from_utf8(log).unwrap().contains("Retrieving secret C"));
        assert_scrubbed(&env);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_blank_output_is_empty_secret() {
        let dir = tempfile::tempdir().unwrap();
        stub_cli(dir.path(), "echo '   '");
        let location = CliLocation::resolve(dir.path());

        let err = read_secrets(
            &location,
            &mut injected_env(),
            &mut Vec::<u8>::new(),
            &[secret("A", "op://v/i/a")],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OpInjectError::EmptySecret { ref reference } if reference == "op://v/i/a"));
    }

    #[cfg(unix)]
    struct BrokenLog;

    #[cfg(unix)]
    impl Write for BrokenLog {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "log closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_broken_log_does_not_fail_retrieval() {
        let dir = tempfile::tempdir().unwrap();
        stub_cli(dir.path(), "echo value");
        let location = CliLocation::resolve(dir.path());
        let mut env = injected_env();

        let overrides = read_secrets(
            &location,
            &mut env,
            &mut BrokenLog,
            &[secret("A", "op://v/i/a")],
        )
        .await
        .unwrap();

        assert_eq!(overrides.get("A").map(String::as_str), Some("value"));
        assert_scrubbed(&env);
    }
}
