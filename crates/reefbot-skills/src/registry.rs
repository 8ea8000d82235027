//! Skill registry — discovery and merging across precedence sources.
//!
//! Roots are scanned lowest to highest precedence:
//! `extra, bundled, managed, ~/.agents/skills, <workspace>/.agents/skills,
//! <workspace>/skills`. In each root both a root-level `SKILL.md` and
//! one-level-deep `<root>/<name>/SKILL.md` files are accepted. Later
//! sources win by name.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::definition::{parse_skill_file, SkillDefinition, SkillSource};

/// Discovers and merges skills from an ordered list of roots.
pub struct SkillRegistry {
    /// `(source, root)` pairs in ascending precedence order.
    roots: Vec<(SkillSource, PathBuf)>,
}

impl SkillRegistry {
    /// Registry over explicit roots (ascending precedence).
    pub fn with_roots(roots: Vec<(SkillSource, PathBuf)>) -> Self {
        SkillRegistry { roots }
    }

    /// Standard root layout for a workspace:
    /// extra dirs, bundled, managed, `~/.agents/skills`,
    /// `<workspace>/.agents/skills`, `<workspace>/skills`.
    pub fn for_workspace(
        workspace: &Path,
        extra: Vec<PathBuf>,
        bundled: Option<PathBuf>,
        managed: Option<PathBuf>,
    ) -> Self {
        let mut roots: Vec<(SkillSource, PathBuf)> = Vec::new();
        for dir in extra {
            roots.push((SkillSource::Extra, dir));
        }
        if let Some(dir) = bundled {
            roots.push((SkillSource::Bundled, dir));
        }
        if let Some(dir) = managed {
            roots.push((SkillSource::Managed, dir));
        }
        if let Some(home) = dirs_next::home_dir() {
            roots.push((SkillSource::PersonalAgents, home.join(".agents").join("skills")));
        }
        roots.push((
            SkillSource::ProjectAgents,
            workspace.join(".agents").join("skills"),
        ));
        roots.push((SkillSource::Workspace, workspace.join("skills")));

        SkillRegistry { roots }
    }

    /// Discover all skills, merged by name with later sources winning,
    /// sorted by name.
    pub fn discover(&self) -> Vec<SkillDefinition> {
        let mut merged: std::collections::BTreeMap<String, SkillDefinition> =
            std::collections::BTreeMap::new();

        for (source, root) in &self.roots {
            for path in scan_skill_files(root) {
                let Ok(content) = std::fs::read_to_string(&path) else {
                    continue;
                };
                let skill = parse_skill_file(&content, &path, *source);
                debug!(name = %skill.name, source = source.label(), "discovered skill");
                merged.insert(skill.name.clone(), skill);
            }
        }

        merged.into_values().collect()
    }

    /// The `## Skills` prompt section, listing every skill whose
    /// model-facing invocation is not disabled. Empty string when nothing
    /// is listable.
    pub fn prompt_snapshot(skills: &[SkillDefinition]) -> String {
        let listable: Vec<&SkillDefinition> = skills
            .iter()
            .filter(|s| !s.invocation.disable_model_invocation)
            .collect();
        if listable.is_empty() {
            return String::new();
        }

        let mut parts = vec!["## Skills".to_string()];
        for skill in listable {
            parts.push(format!(
                "### {}\n{}\n{}",
                skill.name, skill.description, skill.body
            ));
        }
        parts.join("\n")
    }
}

/// Collect `SKILL.md` paths in a root: the root-level file plus one-deep
/// subdirectory files.
fn scan_skill_files(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if !root.is_dir() {
        return out;
    }

    let root_level = root.join("SKILL.md");
    if root_level.is_file() {
        out.push(root_level);
    }

    if let Ok(entries) = std::fs::read_dir(root) {
        let mut dirs: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();
        for dir in dirs {
            let nested = dir.join("SKILL.md");
            if nested.is_file() {
                out.push(nested);
            }
        }
    }

    out
}
