//! Reefbot Skills — workspace capability units discovered via `SKILL.md`.
//!
//! # Architecture
//!
//! - **definition**: frontmatter parsing and the [`SkillDefinition`] value
//! - **registry**: multi-root discovery with last-source-wins merging and
//!   the prompt snapshot
//! - **executors**: pluggable execution backends (process, JavaScript)
//! - **engine**: slash-command / natural-language matching, entrypoint
//!   resolution inside the workspace jail, per-skill timeouts

pub mod definition;
pub mod engine;
pub mod executors;
pub mod registry;

pub use definition::{SkillDefinition, SkillSource};
pub use engine::{SkillInvocation, SkillInvocationEngine, SkillInvocationOutcome};
pub use executors::{JsEngine, JsExecutor, ProcessExecutor, SkillExecutor};
pub use registry::SkillRegistry;
