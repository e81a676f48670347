//! The job a retrieval runs for.

use std::path::{Path, PathBuf};

/// Identity and workspace of the running job.
///
/// Credential stores scope their lookups by [`parent_job`](Self::parent_job);
/// the workspace is the last fallback location of the `op` executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobContext {
    parent_job: String,
    workspace: PathBuf,
}

impl JobContext {
    /// Creates a job context.
    pub fn new(parent_job: impl Into<String>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            parent_job: parent_job.into(),
            workspace: workspace.into(),
        }
    }

    /// Full name of the job owning this run.
    pub fn parent_job(&self) -> &str {
        &self.parent_job
    }

    /// Workspace directory of the run.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }
}
