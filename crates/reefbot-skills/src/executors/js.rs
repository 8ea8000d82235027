//! JavaScript executor — sandboxed host API over a pluggable engine.
//!
//! The embedded engine itself is a host-provided [`JsEngine`]; this module
//! owns the sandbox contract around it:
//! - the host API surface is exactly `{log, readFile, writeFile, mkdir,
//!   exists, httpGet}` — no other bridge to OS capabilities
//! - every path argument goes through the workspace guard, and a violation
//!   propagates as the thrown error of the JS call
//! - `httpGet` rejects any scheme other than `http`/`https`
//! - the result is the last non-empty return value, falling back to the
//!   final `log(...)` entry
//!
//! With no engine installed, the executor declines every entrypoint and the
//! process executor runs `js` files through `node` instead.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use reefbot_core::{EngineError, WorkspaceGuard};

use super::{extension_of, PreparedInvocation, SkillExecutor};

/// Network backend for `httpGet`. Absent by default; hosts that allow
/// outbound fetches from skills install one.
pub type HttpFetcher = Arc<dyn Fn(&str) -> Result<String, EngineError> + Send + Sync>;

/// The host API exposed to skill scripts.
///
/// All filesystem operations are jailed through the workspace guard.
pub struct JsHostApi<'a> {
    guard: &'a WorkspaceGuard,
    fetcher: Option<HttpFetcher>,
    logs: Vec<String>,
}

impl<'a> JsHostApi<'a> {
    pub fn new(guard: &'a WorkspaceGuard, fetcher: Option<HttpFetcher>) -> Self {
        JsHostApi {
            guard,
            fetcher,
            logs: Vec::new(),
        }
    }

    /// Append a log line. Returned in insertion order.
    pub fn log(&mut self, message: impl Into<String>) {
        self.logs.push(message.into());
    }

    /// The accumulated log lines.
    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    pub fn read_file(&self, path: &str) -> Result<String, EngineError> {
        let resolved = self.guard.resolve(path)?;
        std::fs::read_to_string(&resolved)
            .map_err(|e| EngineError::Unavailable(format!("readFile {path}: {e}")))
    }

    pub fn write_file(&self, path: &str, contents: &str) -> Result<(), EngineError> {
        let resolved = self.guard.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::Unavailable(format!("writeFile {path}: {e}")))?;
        }
        std::fs::write(&resolved, contents)
            .map_err(|e| EngineError::Unavailable(format!("writeFile {path}: {e}")))
    }

    pub fn mkdir(&self, path: &str) -> Result<(), EngineError> {
        let resolved = self.guard.resolve(path)?;
        std::fs::create_dir_all(&resolved)
            .map_err(|e| EngineError::Unavailable(format!("mkdir {path}: {e}")))
    }

    pub fn exists(&self, path: &str) -> Result<bool, EngineError> {
        let resolved = self.guard.resolve(path)?;
        Ok(resolved.exists())
    }

    pub fn http_get(&self, url: &str) -> Result<String, EngineError> {
        let lowered = url.to_ascii_lowercase();
        if !lowered.starts_with("http://") && !lowered.starts_with("https://") {
            return Err(EngineError::Unavailable(format!(
                "httpGet: unsupported scheme in {url}"
            )));
        }
        match &self.fetcher {
            Some(fetch) => fetch(url),
            None => Err(EngineError::Unavailable(
                "httpGet: no network backend installed".into(),
            )),
        }
    }
}

/// An embedded JavaScript engine.
///
/// `evaluate` runs the script against the host API and returns the script's
/// final return value, if any. Uncaught exceptions must be captured into
/// the error value rather than unwinding.
pub trait JsEngine: Send + Sync {
    fn evaluate(
        &self,
        script: &str,
        host: &mut JsHostApi<'_>,
    ) -> Result<Option<String>, EngineError>;
}

/// JavaScript execution backend.
pub struct JsExecutor {
    engine: Option<Arc<dyn JsEngine>>,
    fetcher: Option<HttpFetcher>,
}

impl JsExecutor {
    /// Executor with an installed engine.
    pub fn new(engine: Arc<dyn JsEngine>) -> Self {
        JsExecutor {
            engine: Some(engine),
            fetcher: None,
        }
    }

    /// Executor with no engine — declines every entrypoint.
    pub fn unavailable() -> Self {
        JsExecutor {
            engine: None,
            fetcher: None,
        }
    }

    pub fn with_fetcher(mut self, fetcher: HttpFetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    fn env_matches(primary_env: Option<&str>) -> bool {
        matches!(
            primary_env.map(|e| e.to_ascii_lowercase()).as_deref(),
            Some("js" | "javascript" | "javascriptcore" | "node")
        )
    }
}

#[async_trait]
impl SkillExecutor for JsExecutor {
    fn id(&self) -> &str {
        "js"
    }

    fn can_handle(&self, entrypoint: &Path, primary_env: Option<&str>) -> bool {
        if self.engine.is_none() {
            return false;
        }
        let ext_matches = matches!(
            extension_of(entrypoint).as_deref(),
            Some("js" | "mjs" | "cjs")
        );
        ext_matches || Self::env_matches(primary_env)
    }

    async fn execute(
        &self,
        invocation: &PreparedInvocation,
        guard: &WorkspaceGuard,
    ) -> Result<String, EngineError> {
        let engine = self
            .engine
            .as_ref()
            .ok_or_else(|| EngineError::Unavailable("no embedded JavaScript engine".into()))?;

        let script = std::fs::read_to_string(&invocation.entrypoint).map_err(|e| {
            EngineError::Unavailable(format!(
                "cannot read entrypoint {}: {e}",
                invocation.entrypoint.display()
            ))
        })?;

        let mut host = JsHostApi::new(guard, self.fetcher.clone());
        let returned = engine.evaluate(&script, &mut host)?;

        let result = returned
            .filter(|value| !value.trim().is_empty())
            .or_else(|| host.logs().last().cloned())
            .unwrap_or_default();
        Ok(result)
    }
}
