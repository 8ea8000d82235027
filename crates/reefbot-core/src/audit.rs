//! Security audit — static scan of config and state paths.
//!
//! A pure pass (no I/O beyond reading the named files) that flags risky
//! defaults and plaintext secrets. Findings rank `error > warning > info`,
//! then by ID ascending.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::config::schema::Config;

/// Finding severity, ascending.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// One audit finding.
#[derive(Clone, Debug, PartialEq)]
pub struct Finding {
    pub id: String,
    pub severity: Severity,
    pub message: String,
}

impl Finding {
    fn new(id: &str, severity: Severity, message: impl Into<String>) -> Self {
        Finding {
            id: id.to_string(),
            severity,
            message: message.into(),
        }
    }
}

/// Inputs to an audit pass. All fields are optional; absent inputs skip
/// their checks.
#[derive(Debug, Default)]
pub struct AuditInput<'a> {
    /// Parsed configuration to inspect.
    pub config: Option<&'a Config>,
    /// On-disk path of the config file (permission check).
    pub config_path: Option<&'a Path>,
    /// State files to permission-check (sessions, memory, credentials).
    pub state_paths: Vec<PathBuf>,
    /// Files to scan for plaintext secrets.
    pub scan_paths: Vec<PathBuf>,
}

/// Run the audit and return findings ranked by severity then ID.
pub fn run_audit(input: &AuditInput<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();

    if let Some(config) = input.config {
        check_config_secrets(config, &mut findings);
        check_routing_collapse(config, &mut findings);
        check_mention_only(config, &mut findings);
        check_gateway_auth(config, &mut findings);
        check_local_model(config, &mut findings);
    }

    let mut perm_paths: Vec<PathBuf> = Vec::new();
    if let Some(path) = input.config_path {
        perm_paths.push(path.to_path_buf());
    }
    perm_paths.extend(input.state_paths.iter().cloned());
    for path in &perm_paths {
        check_file_permissions(path, &mut findings);
    }

    for path in &input.scan_paths {
        scan_for_plaintext_secrets(path, &mut findings);
    }

    findings.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.id.cmp(&b.id)));
    findings
}

// ─────────────────────────────────────────────
// Checks
// ─────────────────────────────────────────────

fn check_config_secrets(config: &Config, findings: &mut Vec<Finding>) {
    let mut plaintext: Vec<&str> = Vec::new();

    if !config.channels.discord.bot_token.is_empty() {
        plaintext.push("channels.discord.botToken");
    }
    if !config.channels.telegram.bot_token.is_empty() {
        plaintext.push("channels.telegram.botToken");
    }
    if !config.channels.whatsapp_cloud.access_token.is_empty() {
        plaintext.push("channels.whatsappCloud.accessToken");
    }
    for (field, value) in config.models.secret_fields() {
        if !value.is_empty() {
            plaintext.push(field);
        }
    }

    if !plaintext.is_empty() {
        findings.push(Finding::new(
            "secrets.config.plaintext",
            Severity::Warning,
            format!(
                "config holds plaintext secrets ({}); prefer the credential store",
                plaintext.join(", ")
            ),
        ));
    }
}

fn check_routing_collapse(config: &Config, findings: &mut Vec<Finding>) {
    let routing = &config.routing;
    if !routing.include_channel_id && !routing.include_account_id && !routing.include_peer_id {
        findings.push(Finding::new(
            "routing.shared-session",
            Severity::Warning,
            "all session-key inclusion flags are off; every conversation shares one session",
        ));
    }
}

fn check_mention_only(config: &Config, findings: &mut Vec<Finding>) {
    let mut open_channels: Vec<&str> = Vec::new();
    if config.channels.discord.enabled && !config.channels.discord.mention_only {
        open_channels.push("discord");
    }
    if config.channels.telegram.enabled && !config.channels.telegram.mention_only {
        open_channels.push("telegram");
    }
    if !open_channels.is_empty() {
        findings.push(Finding::new(
            "channels.mention-only-disabled",
            Severity::Warning,
            format!(
                "mention-only filtering is disabled on enabled channels: {}",
                open_channels.join(", ")
            ),
        ));
    }
}

fn check_gateway_auth(config: &Config, findings: &mut Vec<Finding>) {
    let mode = config.gateway.auth_mode.trim();
    if mode.is_empty() || mode.eq_ignore_ascii_case("none") {
        findings.push(Finding::new(
            "gateway.auth-mode-unsafe",
            Severity::Error,
            "gateway authMode is empty or \"none\"",
        ));
    }
}

fn check_local_model(config: &Config, findings: &mut Vec<Finding>) {
    if config.models.local.enabled && config.models.local.model_path.trim().is_empty() {
        findings.push(Finding::new(
            "models.local.model-path-missing",
            Severity::Warning,
            "local model runtime is enabled without a modelPath",
        ));
    }
}

#[cfg(unix)]
fn check_file_permissions(path: &Path, findings: &mut Vec<Finding>) {
    use std::os::unix::fs::PermissionsExt;

    let Ok(metadata) = std::fs::metadata(path) else {
        return;
    };
    let mode = metadata.permissions().mode();

    if mode & 0o002 != 0 {
        findings.push(Finding::new(
            "fs.permissions.world-writable",
            Severity::Error,
            format!("{} is world-writable (mode {:o})", path.display(), mode & 0o777),
        ));
    } else if mode & 0o077 != 0 {
        findings.push(Finding::new(
            "fs.permissions.group-other",
            Severity::Warning,
            format!(
                "{} is readable by group/other (mode {:o}); recommend 0600",
                path.display(),
                mode & 0o777
            ),
        ));
    }
}

#[cfg(not(unix))]
fn check_file_permissions(_path: &Path, _findings: &mut Vec<Finding>) {}

fn secret_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r#"(?i)(api[_-]?key|secret|token|password)\s*[:=]\s*['"]?[A-Za-z0-9_\-/+]{16,}"#)
                .unwrap(),
            Regex::new(r"sk-[A-Za-z0-9_\-]{20,}").unwrap(),
            Regex::new(r"(?i)bearer\s+[A-Za-z0-9._\-]{16,}").unwrap(),
        ]
    })
}

fn scan_for_plaintext_secrets(path: &Path, findings: &mut Vec<Finding>) {
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };
    if secret_patterns().iter().any(|re| re.is_match(&content)) {
        findings.push(Finding::new(
            "secrets.file.plaintext",
            Severity::Warning,
            format!("{} appears to contain a plaintext secret", path.display()),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ids(findings: &[Finding]) -> Vec<&str> {
        findings.iter().map(|f| f.id.as_str()).collect()
    }

    #[test]
    fn test_default_config_is_clean() {
        let config = Config::default();
        let findings = run_audit(&AuditInput {
            config: Some(&config),
            ..Default::default()
        });
        assert!(findings.is_empty(), "unexpected findings: {findings:?}");
    }

    #[test]
    fn test_plaintext_secret_in_config() {
        let mut config = Config::default();
        config.channels.telegram.bot_token = "bot123:ABC".into();

        let findings = run_audit(&AuditInput {
            config: Some(&config),
            ..Default::default()
        });
        assert_eq!(ids(&findings), vec!["secrets.config.plaintext"]);
        assert_eq!(findings[0].severity, Severity::Warning);
        assert!(findings[0].message.contains("channels.telegram.botToken"));
    }

    #[test]
    fn test_routing_collapse_warning() {
        let mut config = Config::default();
        config.routing.include_channel_id = false;
        config.routing.include_account_id = false;
        config.routing.include_peer_id = false;

        let findings = run_audit(&AuditInput {
            config: Some(&config),
            ..Default::default()
        });
        assert_eq!(ids(&findings), vec!["routing.shared-session"]);
    }

    #[test]
    fn test_mention_only_disabled_on_enabled_channel() {
        let mut config = Config::default();
        config.channels.discord.enabled = true;
        config.channels.discord.mention_only = false;

        let findings = run_audit(&AuditInput {
            config: Some(&config),
            ..Default::default()
        });
        assert_eq!(ids(&findings), vec!["channels.mention-only-disabled"]);
        assert!(findings[0].message.contains("discord"));
    }

    #[test]
    fn test_mention_only_disabled_on_disabled_channel_is_fine() {
        let mut config = Config::default();
        config.channels.discord.mention_only = false;

        let findings = run_audit(&AuditInput {
            config: Some(&config),
            ..Default::default()
        });
        assert!(findings.is_empty());
    }

    #[test]
    fn test_gateway_auth_none_is_error() {
        let mut config = Config::default();
        config.gateway.auth_mode = "none".into();

        let findings = run_audit(&AuditInput {
            config: Some(&config),
            ..Default::default()
        });
        assert_eq!(ids(&findings), vec!["gateway.auth-mode-unsafe"]);
        assert_eq!(findings[0].severity, Severity::Error);
    }

    #[test]
    fn test_local_model_without_path() {
        let mut config = Config::default();
        config.models.local.enabled = true;

        let findings = run_audit(&AuditInput {
            config: Some(&config),
            ..Default::default()
        });
        assert_eq!(ids(&findings), vec!["models.local.model-path-missing"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_permission_checks() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let loose = dir.path().join("loose.json");
        let world = dir.path().join("world.json");
        std::fs::write(&loose, "{}").unwrap();
        std::fs::write(&world, "{}").unwrap();
        std::fs::set_permissions(&loose, std::fs::Permissions::from_mode(0o644)).unwrap();
        std::fs::set_permissions(&world, std::fs::Permissions::from_mode(0o666)).unwrap();

        let findings = run_audit(&AuditInput {
            state_paths: vec![loose, world],
            ..Default::default()
        });

        // Error ranks before warning
        assert_eq!(
            ids(&findings),
            vec!["fs.permissions.world-writable", "fs.permissions.group-other"]
        );
    }

    #[test]
    fn test_plaintext_scan_flags_api_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "api_key = \"sk-live-0123456789abcdef0123\"").unwrap();

        let findings = run_audit(&AuditInput {
            scan_paths: vec![path],
            ..Default::default()
        });
        assert_eq!(ids(&findings), vec!["secrets.file.plaintext"]);
    }

    #[test]
    fn test_plaintext_scan_ignores_clean_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "just some notes about the weather").unwrap();

        let findings = run_audit(&AuditInput {
            scan_paths: vec![path],
            ..Default::default()
        });
        assert!(findings.is_empty());
    }

    #[test]
    fn test_findings_ranked_severity_then_id() {
        let mut config = Config::default();
        config.gateway.auth_mode = String::new();
        config.channels.telegram.bot_token = "t".into();
        config.routing.include_channel_id = false;
        config.routing.include_account_id = false;
        config.routing.include_peer_id = false;

        let findings = run_audit(&AuditInput {
            config: Some(&config),
            ..Default::default()
        });
        assert_eq!(
            ids(&findings),
            vec![
                "gateway.auth-mode-unsafe",
                "routing.shared-session",
                "secrets.config.plaintext",
            ]
        );
    }
}
