//! Skill invocation engine — matching, jail-checked resolution, execution.
//!
//! Matching shapes:
//! - *Explicit*: `/skill <name> [args]` or `/<name> [args]`, names compared
//!   case-insensitively after whitespace/underscore → hyphen normalization
//! - *Implicit*: natural-language mention of a skill name, only for skills
//!   with `requires_explicit_invocation == false` and
//!   `user_invocable == true`; the longest matching name wins
//!
//! Execution resolves the entrypoint relative to the skill directory inside
//! the workspace jail, picks the first executor that can handle it, and
//! races it against the per-skill timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use reefbot_core::{EngineError, WorkspaceGuard};

use crate::definition::SkillDefinition;
use crate::executors::{JsExecutor, PreparedInvocation, ProcessExecutor, SkillExecutor};
use crate::registry::SkillRegistry;

/// Default per-skill execution timeout.
pub const DEFAULT_SKILL_TIMEOUT_MS: u64 = 30_000;

/// Result envelope of a successful skill run.
#[derive(Clone, Debug, PartialEq)]
pub struct SkillInvocationOutcome {
    pub skill_name: String,
    pub output: String,
    pub executor_id: Option<String>,
    pub duration_ms: Option<u64>,
}

/// A matched invocation attempt. Callers decide error policy by shape:
/// explicit failures surface, implicit failures are swallowed.
#[derive(Debug)]
pub struct SkillInvocation {
    pub explicit: bool,
    pub result: Result<SkillInvocationOutcome, EngineError>,
}

/// Matches user text against discovered skills and executes entrypoints.
pub struct SkillInvocationEngine {
    registry: SkillRegistry,
    guard: WorkspaceGuard,
    executors: Vec<Arc<dyn SkillExecutor>>,
    default_timeout_ms: u64,
}

impl SkillInvocationEngine {
    /// Engine with the default executor chain (JavaScript first, process
    /// fallback). No embedded JS engine ships by default, so `js`
    /// entrypoints reach `node` through the process executor.
    pub fn new(registry: SkillRegistry, guard: WorkspaceGuard) -> Self {
        SkillInvocationEngine {
            registry,
            guard,
            executors: vec![
                Arc::new(JsExecutor::unavailable()),
                Arc::new(ProcessExecutor::new()),
            ],
            default_timeout_ms: DEFAULT_SKILL_TIMEOUT_MS,
        }
    }

    /// Replace the executor chain.
    pub fn with_executors(mut self, executors: Vec<Arc<dyn SkillExecutor>>) -> Self {
        self.executors = executors;
        self
    }

    /// Override the default per-skill timeout.
    pub fn with_default_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    /// Current discovered skills, merged and sorted.
    pub fn skills(&self) -> Vec<SkillDefinition> {
        self.registry.discover()
    }

    /// The `## Skills` prompt section for the current skill set.
    pub fn prompt_snapshot(&self) -> String {
        SkillRegistry::prompt_snapshot(&self.skills())
    }

    /// Attempt invocation for a piece of user text. `None` when no skill
    /// matched.
    pub async fn invoke_if_requested(&self, text: &str) -> Option<SkillInvocation> {
        let skills = self.skills();
        let trimmed = text.trim();

        if let Some((skill, args)) = match_explicit(trimmed, &skills) {
            let result = self.run_skill(&skill, &args).await.and_then(|outcome| {
                // An explicit invocation that produced nothing is a failure
                if outcome.output.trim().is_empty() {
                    Err(EngineError::Unavailable(format!(
                        "skill {} produced no output",
                        outcome.skill_name
                    )))
                } else {
                    Ok(outcome)
                }
            });
            return Some(SkillInvocation {
                explicit: true,
                result,
            });
        }

        if let Some(skill) = match_implicit(trimmed, &skills) {
            let result = self.run_skill(&skill, trimmed).await;
            if let Err(e) = &result {
                debug!(skill = %skill.name, error = %e, "implicit skill invocation failed");
            }
            return Some(SkillInvocation {
                explicit: false,
                result,
            });
        }

        None
    }

    /// Resolve and execute one skill with its timeout.
    async fn run_skill(
        &self,
        skill: &SkillDefinition,
        input: &str,
    ) -> Result<SkillInvocationOutcome, EngineError> {
        let entrypoint = skill.entrypoint().ok_or_else(|| {
            EngineError::InvalidConfiguration(format!("skill {} has no entrypoint", skill.name))
        })?;

        // Relative entrypoints resolve against the skill's own directory,
        // then the result must stay inside the jail.
        let candidate = skill.dir().join(entrypoint);
        let resolved = self.guard.resolve(&candidate)?;

        let invocation = PreparedInvocation {
            skill_name: skill.name.clone(),
            entrypoint: resolved,
            primary_env: skill.metadata.primary_env.clone(),
            input: input.trim().to_string(),
        };

        let executor = self
            .executors
            .iter()
            .find(|e| {
                e.can_handle(
                    &invocation.entrypoint,
                    invocation.primary_env.as_deref(),
                )
            })
            .ok_or_else(|| {
                EngineError::Unavailable(format!(
                    "no executor can handle entrypoint {}",
                    invocation.entrypoint.display()
                ))
            })?;

        let timeout_ms = skill.timeout_ms.unwrap_or(self.default_timeout_ms);
        let started = Instant::now();

        let output = tokio::select! {
            result = executor.execute(&invocation, &self.guard) => result?,
            _ = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
                warn!(skill = %skill.name, timeout_ms, "skill invocation timed out");
                return Err(EngineError::Timeout(timeout_ms));
            }
        };

        Ok(SkillInvocationOutcome {
            skill_name: skill.name.clone(),
            output,
            executor_id: Some(executor.id().to_string()),
            duration_ms: Some(started.elapsed().as_millis() as u64),
        })
    }
}

/// Normalize a skill name for matching: lowercase, whitespace and
/// underscores become hyphens.
fn normalize_name(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() || c == '_' { '-' } else { c })
        .collect()
}

/// Match a leading slash command: `/skill <name> [args]` or `/<name> [args]`.
fn match_explicit(text: &str, skills: &[SkillDefinition]) -> Option<(SkillDefinition, String)> {
    let rest = text.strip_prefix('/')?;
    let mut tokens = rest.split_whitespace();
    let first = tokens.next()?;

    let (name_token, args) = if first.eq_ignore_ascii_case("skill") {
        let name = tokens.next()?;
        (name, tokens.collect::<Vec<_>>().join(" "))
    } else {
        (first, tokens.collect::<Vec<_>>().join(" "))
    };

    let wanted = normalize_name(name_token);
    skills
        .iter()
        .find(|s| normalize_name(&s.name) == wanted)
        .map(|s| (s.clone(), args))
}

/// Match a natural-language mention of a skill name.
///
/// Both text and names are lowercased with every non-alphanumeric run
/// collapsed to a single space, then padded with spaces so only whole-word
/// mentions match. The longest matching name wins.
fn match_implicit(text: &str, skills: &[SkillDefinition]) -> Option<SkillDefinition> {
    let haystack = format!(" {} ", collapse_non_alphanumeric(text));

    skills
        .iter()
        .filter(|s| s.invocation.user_invocable && !s.invocation.requires_explicit_invocation)
        .filter_map(|s| {
            let needle = format!(" {} ", collapse_non_alphanumeric(&s.name));
            if needle.trim().is_empty() {
                return None;
            }
            if haystack.contains(&needle) {
                Some((needle.len(), s.clone()))
            } else {
                None
            }
        })
        .max_by_key(|(len, _)| *len)
        .map(|(_, s)| s)
}

/// Lowercase and collapse every run of non-alphanumerics to one space.
fn collapse_non_alphanumeric(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_space = true;
    for c in raw.to_lowercase().chars() {
        if c.is_alphanumeric() {
            out.push(c);
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim().to_string()
}
