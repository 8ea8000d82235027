//! Skill execution backends.
//!
//! Executors are tried in registration order; the first whose
//! `can_handle` accepts the entrypoint runs it. The JavaScript executor
//! declines everything while no engine is installed, which routes `js`
//! entrypoints to the process executor (`node`).

mod js;
mod process;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use reefbot_core::{EngineError, WorkspaceGuard};

pub use js::{JsEngine, JsExecutor, JsHostApi};
pub use process::ProcessExecutor;

/// A skill invocation resolved and ready to execute.
#[derive(Clone, Debug)]
pub struct PreparedInvocation {
    pub skill_name: String,
    /// Jail-checked absolute entrypoint path.
    pub entrypoint: PathBuf,
    /// Preferred execution environment from frontmatter.
    pub primary_env: Option<String>,
    /// Trimmed user input passed to the entrypoint.
    pub input: String,
}

/// One execution backend.
#[async_trait]
pub trait SkillExecutor: Send + Sync {
    /// Stable executor identifier, reported in diagnostics.
    fn id(&self) -> &str;

    /// Whether this executor can run the given entrypoint.
    fn can_handle(&self, entrypoint: &Path, primary_env: Option<&str>) -> bool;

    /// Run the entrypoint and return its output.
    async fn execute(
        &self,
        invocation: &PreparedInvocation,
        guard: &WorkspaceGuard,
    ) -> Result<String, EngineError>;
}

/// Lowercase extension of a path, if any.
pub(crate) fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}
