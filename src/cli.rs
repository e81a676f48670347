//! Invocation of the `op` command-line tool.
//!
//! This module locates the executable, builds the environment it runs with,
//! and captures its output.

use crate::env::{ENV_CONNECT_HOST, ENV_CONNECT_TOKEN, ENV_SERVICE_ACCOUNT_TOKEN};
use crate::{OpInjectError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Variable naming the integration calling the CLI.
pub const ENV_INTEGRATION_NAME: &str = "OP_INTEGRATION_NAME";
/// Variable carrying the integration's short id.
pub const ENV_INTEGRATION_ID: &str = "OP_INTEGRATION_ID";
/// Variable carrying the integration build number.
pub const ENV_INTEGRATION_BUILD_NUMBER: &str = "OP_INTEGRATION_BUILDNUMBER";

/// Integration name reported to 1Password.
pub const INTEGRATION_NAME: &str = "1Password Jenkins Plugin";
/// Integration short id reported to 1Password.
pub const INTEGRATION_ID: &str = "JEN";
/// Integration build number reported to 1Password.
pub const INTEGRATION_BUILD_NUMBER: &str = "0001001";

/// Name of the CLI executable inside a CLI directory.
pub const EXECUTABLE_NAME: &str = "op";

/// Where the CLI lives and where it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliLocation {
    /// Path of the executable
    pub executable: PathBuf,
    /// Working directory of every invocation
    pub working_dir: PathBuf,
}

impl CliLocation {
    /// Resolves a configured CLI path.
    ///
    /// A path ending in `.exe` (any case) is the executable itself and runs in
    /// its parent directory. Anything else is a directory holding `op`.
    ///
    /// ```
    /// use opinject::cli::CliLocation;
    /// use std::path::Path;
    ///
    /// let loc = CliLocation::resolve("/opt/1password");
    /// assert_eq!(loc.executable, Path::new("/opt/1password/op"));
    ///
    /// let loc = CliLocation::resolve("C:/tools/OP.EXE");
    /// assert_eq!(loc.executable, Path::new("C:/tools/OP.EXE"));
    /// assert_eq!(loc.working_dir, Path::new("C:/tools"));
    /// ```
    pub fn resolve(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let is_exe = path
            .to_string_lossy()
            .to_ascii_lowercase()
            .ends_with(".exe");

        if is_exe {
            let working_dir = path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            Self {
                executable: path.to_path_buf(),
                working_dir,
            }
        } else {
            Self {
                executable: path.join(EXECUTABLE_NAME),
                working_dir: path.to_path_buf(),
            }
        }
    }
}

/// Captured output of one CLI invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit code, `None` if terminated by a signal
    pub status: Option<i32>,
}

/// Environment of CLI invocations.
///
/// Auth variables are added only when the operator has not set them already,
/// and are removed again with [`scrub_credentials`](Self::scrub_credentials).
#[derive(Debug, Clone, Default)]
pub struct LaunchEnvironment {
    vars: HashMap<String, String>,
}

impl LaunchEnvironment {
    /// Starts from a base environment.
    pub fn new(base: HashMap<String, String>) -> Self {
        Self { vars: base }
    }

    /// Sets a variable unless it is already present.
    pub fn put_if_absent(&mut self, key: &str, value: &str) {
        self.vars
            .entry(key.to_string())
            .or_insert_with(|| value.to_string());
    }

    /// Sets a variable, replacing any existing value.
    pub fn set(&mut self, key: &str, value: &str) {
        self.vars.insert(key.to_string(), value.to_string());
    }

    /// Adds the integration identity variables.
    pub fn set_integration_identity(&mut self) {
        self.set(ENV_INTEGRATION_NAME, INTEGRATION_NAME);
        self.set(ENV_INTEGRATION_ID, INTEGRATION_ID);
        self.set(ENV_INTEGRATION_BUILD_NUMBER, INTEGRATION_BUILD_NUMBER);
    }

    /// Removes the host and token variables.
    pub fn scrub_credentials(&mut self) {
        for key in [ENV_CONNECT_HOST, ENV_CONNECT_TOKEN, ENV_SERVICE_ACCOUNT_TOKEN] {
            self.vars.remove(key);
        }
    }

    /// Reads a variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// All variables.
    pub fn vars(&self) -> &HashMap<String, String> {
        &self.vars
    }
}

/// Runs `<executable> read <reference>` and captures its output.
///
/// The process gets exactly the variables of `env`. A non-zero exit code is
/// not an error here; callers judge the result by its output.
///
/// # Errors
///
/// Returns [`OpInjectError::ProcessLaunchFailed`] if the process cannot be
/// spawned or its output cannot be collected.
pub async fn run_read(
    location: &CliLocation,
    reference: &str,
    env: &LaunchEnvironment,
) -> Result<ProcessResult> {
    let mut cmd = Command::new(&location.executable);
    cmd.arg("read").arg(reference);
    cmd.current_dir(&location.working_dir);
    cmd.env_clear();
    cmd.envs(env.vars());
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let output = cmd.output().await.map_err(|e| OpInjectError::ProcessLaunchFailed {
        command: format!("{} read {}", location.executable.display(), reference),
        message: e.to_string(),
    })?;

    Ok(ProcessResult {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        status: output.status.code(),
    })
}
