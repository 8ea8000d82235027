//! Skill definitions and `SKILL.md` frontmatter parsing.
//!
//! A skill file is Markdown with a minimal YAML-like frontmatter block
//! delimited by `---` lines: scalar `key: value` pairs only, with quoted
//! strings unwrapped. Unknown keys are preserved verbatim so future fields
//! survive a round trip through older builds.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Where a skill was discovered, ascending precedence. When two sources
/// define the same name, the higher-precedence source wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SkillSource {
    Extra,
    Bundled,
    Managed,
    PersonalAgents,
    ProjectAgents,
    Workspace,
}

impl SkillSource {
    pub fn label(&self) -> &'static str {
        match self {
            SkillSource::Extra => "extra",
            SkillSource::Bundled => "bundled",
            SkillSource::Managed => "managed",
            SkillSource::PersonalAgents => "personalAgents",
            SkillSource::ProjectAgents => "projectAgents",
            SkillSource::Workspace => "workspace",
        }
    }
}

/// Invocation gating flags parsed from frontmatter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkillInvocationFlags {
    /// May the user trigger this skill at all?
    pub user_invocable: bool,
    /// Hide this skill from the model-facing prompt snapshot.
    pub disable_model_invocation: bool,
    /// Require a `/slash` trigger; never match natural language.
    pub requires_explicit_invocation: bool,
}

impl Default for SkillInvocationFlags {
    fn default() -> Self {
        Self {
            user_invocable: true,
            disable_model_invocation: false,
            requires_explicit_invocation: false,
        }
    }
}

/// Auxiliary metadata parsed from frontmatter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SkillMetadata {
    /// Inject the full body into every prompt.
    pub always: bool,
    pub skill_key: Option<String>,
    /// Preferred execution environment (e.g. "js", "py").
    pub primary_env: Option<String>,
}

/// One discovered skill.
#[derive(Clone, Debug)]
pub struct SkillDefinition {
    pub name: String,
    pub description: String,
    /// Markdown body below the frontmatter.
    pub body: String,
    pub file_path: PathBuf,
    pub source: SkillSource,
    /// All raw frontmatter pairs, unknown keys included.
    pub frontmatter: BTreeMap<String, String>,
    pub metadata: SkillMetadata,
    pub invocation: SkillInvocationFlags,
    /// Per-skill execution timeout override.
    pub timeout_ms: Option<u64>,
}

impl SkillDefinition {
    /// The entrypoint path from frontmatter: `entrypoint`, `script`, or
    /// `run`, first non-empty.
    pub fn entrypoint(&self) -> Option<&str> {
        for key in ["entrypoint", "script", "run"] {
            if let Some(value) = self.frontmatter.get(key) {
                let value = value.trim();
                if !value.is_empty() {
                    return Some(value);
                }
            }
        }
        None
    }

    /// The directory containing the `SKILL.md` file.
    pub fn dir(&self) -> &Path {
        self.file_path.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Parse boolean frontmatter values: `1/true/yes/on` and their negations.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Split a skill file into frontmatter pairs and body.
///
/// Returns an empty map when the file has no frontmatter block; the whole
/// content is then the body.
pub fn parse_frontmatter(content: &str) -> (BTreeMap<String, String>, String) {
    let mut pairs = BTreeMap::new();

    if !content.starts_with("---") {
        return (pairs, content.to_string());
    }

    let after_first = &content[3..];
    let Some(end) = after_first.find("\n---") else {
        return (pairs, content.to_string());
    };

    let block = &after_first[..end];
    for line in block.lines() {
        let line = line.trim();
        if let Some(idx) = line.find(':') {
            let key = line[..idx].trim().to_string();
            let value = unquote(line[idx + 1..].trim());
            if !key.is_empty() {
                pairs.insert(key, value);
            }
        }
    }

    let body = after_first[end + 4..].trim_start_matches('\n').to_string();
    (pairs, body)
}

/// Unwrap a single layer of matching `"` or `'` quotes.
fn unquote(raw: &str) -> String {
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return raw[1..raw.len() - 1].to_string();
        }
    }
    raw.to_string()
}

/// Parse one `SKILL.md` file into a definition.
///
/// Skills without a frontmatter `name` take the parent directory name (or
/// the file stem for root-level files).
pub fn parse_skill_file(content: &str, path: &Path, source: SkillSource) -> SkillDefinition {
    let (frontmatter, body) = parse_frontmatter(content);

    let fallback_name = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("skill")
        .to_string();
    let name = frontmatter
        .get("name")
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or(fallback_name);

    let description = frontmatter.get("description").cloned().unwrap_or_default();

    let get_flag = |keys: &[&str], default: bool| -> bool {
        for key in keys {
            if let Some(raw) = frontmatter.get(*key) {
                if let Some(value) = parse_bool(raw) {
                    return value;
                }
            }
        }
        default
    };

    let invocation = SkillInvocationFlags {
        user_invocable: get_flag(&["user-invocable", "userInvocable"], true),
        disable_model_invocation: get_flag(
            &["disable-model-invocation", "disableModelInvocation"],
            false,
        ),
        requires_explicit_invocation: get_flag(
            &["requires-explicit-invocation", "requiresExplicitInvocation"],
            false,
        ),
    };

    let metadata = SkillMetadata {
        always: get_flag(&["always"], false),
        skill_key: frontmatter.get("skillKey").cloned(),
        primary_env: frontmatter
            .get("primaryEnv")
            .or_else(|| frontmatter.get("primary-env"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
    };

    let timeout_ms = ["timeoutMs", "timeout-ms", "timeout_ms"]
        .iter()
        .find_map(|key| frontmatter.get(*key))
        .and_then(|raw| raw.trim().parse::<u64>().ok());

    SkillDefinition {
        name,
        description,
        body,
        file_path: path.to_path_buf(),
        source,
        frontmatter,
        metadata,
        invocation,
        timeout_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> SkillDefinition {
        parse_skill_file(
            content,
            Path::new("/ws/skills/weather/SKILL.md"),
            SkillSource::Workspace,
        )
    }

    #[test]
    fn test_parse_frontmatter_pairs_and_body() {
        let (pairs, body) =
            parse_frontmatter("---\nname: weather\ndescription: \"Check weather\"\n---\n\n# Body");
        assert_eq!(pairs.get("name").unwrap(), "weather");
        assert_eq!(pairs.get("description").unwrap(), "Check weather");
        assert_eq!(body, "# Body");
    }

    #[test]
    fn test_no_frontmatter_is_all_body() {
        let (pairs, body) = parse_frontmatter("# Just markdown");
        assert!(pairs.is_empty());
        assert_eq!(body, "# Just markdown");
    }

    #[test]
    fn test_unterminated_frontmatter_is_body() {
        let (pairs, body) = parse_frontmatter("---\nname: broken\n");
        assert!(pairs.is_empty());
        assert!(body.contains("broken"));
    }

    #[test]
    fn test_single_quote_unwrapping() {
        let (pairs, _) = parse_frontmatter("---\ndescription: 'single quoted'\n---\nx");
        assert_eq!(pairs.get("description").unwrap(), "single quoted");
    }

    #[test]
    fn test_parse_bool_forms() {
        for raw in ["1", "true", "yes", "on", "TRUE", "Yes"] {
            assert_eq!(parse_bool(raw), Some(true), "raw = {raw}");
        }
        for raw in ["0", "false", "no", "off", "OFF"] {
            assert_eq!(parse_bool(raw), Some(false), "raw = {raw}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_unknown_keys_preserved() {
        let skill = parse("---\nname: weather\nx-custom: kept\n---\nbody");
        assert_eq!(skill.frontmatter.get("x-custom").unwrap(), "kept");
    }

    #[test]
    fn test_name_falls_back_to_directory() {
        let skill = parse_skill_file(
            "---\ndescription: no name here\n---\nbody",
            Path::new("/ws/skills/forecast/SKILL.md"),
            SkillSource::Workspace,
        );
        assert_eq!(skill.name, "forecast");
    }

    #[test]
    fn test_invocation_flags_default() {
        let skill = parse("---\nname: weather\n---\nbody");
        assert!(skill.invocation.user_invocable);
        assert!(!skill.invocation.disable_model_invocation);
        assert!(!skill.invocation.requires_explicit_invocation);
    }

    #[test]
    fn test_invocation_flags_parsed() {
        let skill = parse(
            "---\nname: weather\nuser-invocable: no\ndisable-model-invocation: yes\nrequires-explicit-invocation: 1\n---\nbody",
        );
        assert!(!skill.invocation.user_invocable);
        assert!(skill.invocation.disable_model_invocation);
        assert!(skill.invocation.requires_explicit_invocation);
    }

    #[test]
    fn test_entrypoint_precedence() {
        let skill = parse("---\nname: w\nscript: fallback.sh\nentrypoint: main.sh\n---\nx");
        assert_eq!(skill.entrypoint(), Some("main.sh"));

        let skill = parse("---\nname: w\nrun: run.sh\n---\nx");
        assert_eq!(skill.entrypoint(), Some("run.sh"));

        let skill = parse("---\nname: w\nentrypoint:   \nscript: s.sh\n---\nx");
        assert_eq!(skill.entrypoint(), Some("s.sh"));
    }

    #[test]
    fn test_timeout_key_variants() {
        assert_eq!(parse("---\nname: w\ntimeoutMs: 5000\n---\nx").timeout_ms, Some(5000));
        assert_eq!(parse("---\nname: w\ntimeout-ms: 100\n---\nx").timeout_ms, Some(100));
        assert_eq!(parse("---\nname: w\ntimeout_ms: 7\n---\nx").timeout_ms, Some(7));
        assert_eq!(parse("---\nname: w\n---\nx").timeout_ms, None);
    }

    #[test]
    fn test_primary_env_parsed() {
        let skill = parse("---\nname: w\nprimaryEnv: js\n---\nx");
        assert_eq!(skill.metadata.primary_env.as_deref(), Some("js"));
    }

    #[test]
    fn test_source_precedence_ordering() {
        assert!(SkillSource::Workspace > SkillSource::ProjectAgents);
        assert!(SkillSource::ProjectAgents > SkillSource::PersonalAgents);
        assert!(SkillSource::PersonalAgents > SkillSource::Managed);
        assert!(SkillSource::Managed > SkillSource::Bundled);
        assert!(SkillSource::Bundled > SkillSource::Extra);
    }
}
