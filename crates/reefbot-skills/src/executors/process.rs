//! Process executor — runs skill entrypoints as child processes.
//!
//! Argv shape: `[envBinary, scriptPath, <trimmed input>]`, with the
//! environment binary mapped from the script extension or `primaryEnv`
//! (`py` → `python3`, `sh` → `sh`, `js|mjs|cjs` → `node`). Files with no
//! known environment are executed directly. The working directory is the
//! script's own directory. Exit code ≠ 0 is an error; the reply is stdout,
//! falling back to stderr.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use reefbot_core::{EngineError, WorkspaceGuard};

use super::{extension_of, PreparedInvocation, SkillExecutor};

/// Child-process execution backend.
#[derive(Debug, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        ProcessExecutor
    }

    /// Map an environment name or extension to an interpreter binary.
    fn env_binary(env: &str) -> Option<&'static str> {
        match env {
            "py" | "python" | "python3" => Some("python3"),
            "sh" | "bash" | "shell" => Some("sh"),
            "js" | "mjs" | "cjs" | "javascript" | "node" => Some("node"),
            _ => None,
        }
    }

    fn interpreter_for(invocation: &PreparedInvocation) -> Option<&'static str> {
        if let Some(ext) = extension_of(&invocation.entrypoint) {
            if let Some(binary) = Self::env_binary(&ext) {
                return Some(binary);
            }
        }
        invocation
            .primary_env
            .as_deref()
            .and_then(Self::env_binary)
    }
}

#[async_trait]
impl SkillExecutor for ProcessExecutor {
    fn id(&self) -> &str {
        "process"
    }

    fn can_handle(&self, _entrypoint: &Path, _primary_env: Option<&str>) -> bool {
        // Terminal fallback: anything resolvable on disk can be attempted.
        true
    }

    async fn execute(
        &self,
        invocation: &PreparedInvocation,
        _guard: &WorkspaceGuard,
    ) -> Result<String, EngineError> {
        let script = &invocation.entrypoint;
        let cwd = script.parent().unwrap_or_else(|| Path::new("."));

        let mut command = match Self::interpreter_for(invocation) {
            Some(binary) => {
                let mut cmd = tokio::process::Command::new(binary);
                cmd.arg(script);
                cmd
            }
            None => tokio::process::Command::new(script),
        };
        if !invocation.input.is_empty() {
            command.arg(&invocation.input);
        }
        command.current_dir(cwd);

        debug!(skill = %invocation.skill_name, script = %script.display(), "running skill process");

        let output = command.output().await.map_err(|e| {
            EngineError::Unavailable(format!(
                "failed to spawn skill entrypoint {}: {e}",
                script.display()
            ))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            return Err(EngineError::Unavailable(format!(
                "skill entrypoint exited with {}: {}",
                output.status,
                if stderr.is_empty() { &stdout } else { &stderr }
            )));
        }

        Ok(if stdout.is_empty() { stderr } else { stdout })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn prepared(entrypoint: PathBuf, input: &str) -> PreparedInvocation {
        PreparedInvocation {
            skill_name: "test".into(),
            entrypoint,
            primary_env: None,
            input: input.into(),
        }
    }

    fn make_guard() -> (WorkspaceGuard, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let guard = WorkspaceGuard::new(dir.path().join("ws")).unwrap();
        (guard, dir)
    }

    #[test]
    fn test_interpreter_mapping() {
        let inv = prepared(PathBuf::from("/ws/skill/run.py"), "");
        assert_eq!(ProcessExecutor::interpreter_for(&inv), Some("python3"));

        let inv = prepared(PathBuf::from("/ws/skill/run.sh"), "");
        assert_eq!(ProcessExecutor::interpreter_for(&inv), Some("sh"));

        let inv = prepared(PathBuf::from("/ws/skill/run.mjs"), "");
        assert_eq!(ProcessExecutor::interpreter_for(&inv), Some("node"));

        let inv = prepared(PathBuf::from("/ws/skill/run"), "");
        assert_eq!(ProcessExecutor::interpreter_for(&inv), None);
    }

    #[test]
    fn test_primary_env_used_without_extension() {
        let mut inv = prepared(PathBuf::from("/ws/skill/run"), "");
        inv.primary_env = Some("py".into());
        assert_eq!(ProcessExecutor::interpreter_for(&inv), Some("python3"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_sh_script() {
        let (guard, _dir) = make_guard();
        let skill_dir = guard.root().join("weather");
        std::fs::create_dir_all(&skill_dir).unwrap();
        let script = skill_dir.join("weather.sh");
        std::fs::write(&script, "#!/bin/sh\necho \"{\\\"resolved_location\\\":\\\"Milan, IT\\\"}\"\n")
            .unwrap();

        let executor = ProcessExecutor::new();
        let output = executor
            .execute(&prepared(script, "Milan"), &guard)
            .await
            .unwrap();
        assert!(output.contains("Milan, IT"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_passes_input_argument() {
        let (guard, _dir) = make_guard();
        let skill_dir = guard.root().join("echoer");
        std::fs::create_dir_all(&skill_dir).unwrap();
        let script = skill_dir.join("echoer.sh");
        std::fs::write(&script, "#!/bin/sh\necho \"arg:$1\"\n").unwrap();

        let executor = ProcessExecutor::new();
        let output = executor
            .execute(&prepared(script, "hello world"), &guard)
            .await
            .unwrap();
        assert_eq!(output, "arg:hello world");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_error() {
        let (guard, _dir) = make_guard();
        let skill_dir = guard.root().join("bad");
        std::fs::create_dir_all(&skill_dir).unwrap();
        let script = skill_dir.join("bad.sh");
        std::fs::write(&script, "#!/bin/sh\necho broken >&2\nexit 3\n").unwrap();

        let executor = ProcessExecutor::new();
        let err = executor
            .execute(&prepared(script, ""), &guard)
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
        assert!(err.to_string().contains("broken"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stderr_used_when_stdout_empty() {
        let (guard, _dir) = make_guard();
        let skill_dir = guard.root().join("stderr");
        std::fs::create_dir_all(&skill_dir).unwrap();
        let script = skill_dir.join("stderr.sh");
        std::fs::write(&script, "#!/bin/sh\necho on-stderr >&2\n").unwrap();

        let executor = ProcessExecutor::new();
        let output = executor
            .execute(&prepared(script, ""), &guard)
            .await
            .unwrap();
        assert_eq!(output, "on-stderr");
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let (guard, _dir) = make_guard();
        let executor = ProcessExecutor::new();
        let err = executor
            .execute(
                &prepared(guard.root().join("ghost/nope.xyz"), ""),
                &guard,
            )
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }
}
