//! Status command — configuration and state summary.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use reefbot_core::config::load_config;
use reefbot_core::{utils, SessionStore};

pub fn run(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path);
    let data_dir = utils::get_data_path();

    println!("{}", "Reefbot status".bold());
    println!();

    println!("{}", "Agents".underline());
    println!("  default agent:  {}", config.agents.default_agent_id);
    println!("  workspace root: {}", config.agents.workspace_root);
    println!("  route mappings: {}", config.agents.route_agent_map.len());
    println!();

    println!("{}", "Channels".underline());
    for (name, enabled) in [
        ("discord", config.channels.discord.enabled),
        ("telegram", config.channels.telegram.enabled),
        ("whatsappCloud", config.channels.whatsapp_cloud.enabled),
        ("webchat", true),
    ] {
        let state = if enabled {
            "enabled".green()
        } else {
            "disabled".dimmed()
        };
        println!("  {name}: {state}");
    }
    println!();

    println!("{}", "Models".underline());
    println!("  default provider: {}", config.models.default_provider_id);
    println!();

    println!("{}", "Sessions".underline());
    match SessionStore::open(data_dir.join("sessions.json")) {
        Ok(store) => {
            println!("  stored sessions: {}", store.len());
            for record in store.all_records().iter().take(10) {
                println!("    {} → {}", record.key, record.agent_id);
            }
        }
        Err(e) => println!("  (unreadable: {e})"),
    }

    Ok(())
}
