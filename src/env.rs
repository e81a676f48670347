//! Access to the process environment and system properties.
//!
//! Configuration can be supplied through environment variables or through
//! named system properties. Both are read through [`EnvironmentProvider`] so
//! that tests never touch real process state.

use std::collections::HashMap;

/// Variable carrying the Connect host.
pub const ENV_CONNECT_HOST: &str = "OP_CONNECT_HOST";
/// Variable carrying the raw Connect token.
pub const ENV_CONNECT_TOKEN: &str = "OP_CONNECT_TOKEN";
/// Variable carrying the raw service-account token.
pub const ENV_SERVICE_ACCOUNT_TOKEN: &str = "OP_SERVICE_ACCOUNT_TOKEN";
/// Variable carrying the CLI location.
pub const ENV_CLI_PATH: &str = "OP_CLI_PATH";

/// A configuration value and the names it is published under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    /// Environment variable name
    pub env_var: &'static str,
    /// System property name
    pub property: &'static str,
}

/// Connect host channel.
pub const CONNECT_HOST: Channel = Channel {
    env_var: ENV_CONNECT_HOST,
    property: "jenkins.onepassword.connect_host",
};

/// Connect token channel.
pub const CONNECT_TOKEN: Channel = Channel {
    env_var: ENV_CONNECT_TOKEN,
    property: "jenkins.onepassword.connect_token",
};

/// Service-account token channel.
pub const SERVICE_ACCOUNT_TOKEN: Channel = Channel {
    env_var: ENV_SERVICE_ACCOUNT_TOKEN,
    property: "jenkins.onepassword.service_account_token",
};

/// CLI path channel.
pub const CLI_PATH: Channel = Channel {
    env_var: ENV_CLI_PATH,
    property: "jenkins.onepassword.op_cli_path",
};

/// Source of ambient environment state.
pub trait EnvironmentProvider: Send + Sync {
    /// Reads a process environment variable.
    fn get_env(&self, name: &str) -> Option<String>;

    /// Reads a system property.
    fn get_system_property(&self, name: &str) -> Option<String>;

    /// Snapshot of the whole process environment.
    ///
    /// This is the base environment every CLI invocation starts from.
    fn vars(&self) -> HashMap<String, String>;

    /// Reads a channel: the job environment first, then the process
    /// environment, then system properties.
    fn read_channel(&self, channel: Channel, job_env: &HashMap<String, String>) -> Option<String> {
        job_env
            .get(channel.env_var)
            .cloned()
            .or_else(|| self.get_env(channel.env_var))
            .or_else(|| self.get_system_property(channel.property))
    }
}

/// The real process environment plus an explicit system property table.
///
/// Rust processes have no global property store, so embedding hosts pass the
/// properties they want honored.
#[derive(Debug, Clone, Default)]
pub struct SystemEnvironment {
    properties: HashMap<String, String>,
}

impl SystemEnvironment {
    /// Creates a provider with no system properties.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a system property.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

impl EnvironmentProvider for SystemEnvironment {
    fn get_env(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn get_system_property(&self, name: &str) -> Option<String> {
        self.properties.get(name).cloned()
    }

    fn vars(&self) -> HashMap<String, String> {
        std::env::vars().collect()
    }
}

/// Deterministic provider with fixed variables and properties.
///
/// ```
/// use opinject::env::{EnvironmentProvider, StaticEnvironment};
///
/// let env = StaticEnvironment::new()
///     .with_var("PATH", "/usr/bin")
///     .with_property("jenkins.onepassword.op_cli_path", "/opt/op");
///
/// assert_eq!(env.get_env("PATH").as_deref(), Some("/usr/bin"));
/// assert!(env.get_env("HOME").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironment {
    vars: HashMap<String, String>,
    properties: HashMap<String, String>,
}

impl StaticEnvironment {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an environment variable.
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Adds a system property.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

impl EnvironmentProvider for StaticEnvironment {
    fn get_env(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    fn get_system_property(&self, name: &str) -> Option<String> {
        self.properties.get(name).cloned()
    }

    fn vars(&self) -> HashMap<String, String> {
        self.vars.clone()
    }
}
