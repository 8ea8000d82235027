//! Audit command — run the security audit and print ranked findings.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use reefbot_core::audit::{run_audit, AuditInput, Severity};
use reefbot_core::config::{get_config_path, load_config};
use reefbot_core::utils;

pub fn run(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path);
    let resolved_config_path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);
    let data_dir = utils::get_data_path();

    let state_paths = vec![
        data_dir.join("sessions.json"),
        data_dir.join("conversation-memory.json"),
        data_dir.join("credentials.json"),
    ];
    // The credential store is permission-checked but not content-scanned;
    // holding secrets is its job.
    let scan_paths = vec![
        data_dir.join("sessions.json"),
        data_dir.join("conversation-memory.json"),
    ];

    let findings = run_audit(&AuditInput {
        config: Some(&config),
        config_path: Some(&resolved_config_path),
        state_paths,
        scan_paths,
    });

    if findings.is_empty() {
        println!("{}", "No findings.".green());
        return Ok(());
    }

    for finding in &findings {
        let severity = match finding.severity {
            Severity::Error => "error".red().bold(),
            Severity::Warning => "warning".yellow(),
            Severity::Info => "info".dimmed(),
        };
        println!("{severity} [{}] {}", finding.id, finding.message);
    }

    println!();
    println!("{} finding(s).", findings.len());
    Ok(())
}
