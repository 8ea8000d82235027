//! Configuration schema.
//!
//! Hierarchy: `Config` → `GatewayConfig`, `AgentsConfig`, `ChannelsConfig`,
//! `RoutingConfig`, `ModelsConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case, converted via
//! `#[serde(rename_all = "camelCase")]`. Every section decodes
//! forward-compatibly: unknown fields are ignored and missing fields fall
//! back to documented defaults. Every "enabled" subsection defaults to
//! `false` and is a no-op while disabled.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::Route;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration — loaded from `~/.reefbot/config.json`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub agents: AgentsConfig,
    pub channels: ChannelsConfig,
    pub routing: RoutingConfig,
    pub models: ModelsConfig,
}

impl Config {
    /// Validate cross-field invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), EngineError> {
        self.agents.validate()
    }
}

// ─────────────────────────────────────────────
// Gateway
// ─────────────────────────────────────────────

/// Optional RPC gateway transport settings. The transport itself is an
/// external collaborator; the engine only audits these fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Authentication mode. Empty or `"none"` is flagged by the security
    /// audit as an error.
    pub auth_mode: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 18790,
            auth_mode: "token".to_string(),
        }
    }
}

// ─────────────────────────────────────────────
// Agents
// ─────────────────────────────────────────────

/// Agent identities and the route → agent mapping.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentsConfig {
    /// Agent bound to sessions whose route matches no mapping entry.
    pub default_agent_id: String,
    /// Workspace root for skills and bootstrap context.
    pub workspace_root: String,
    /// Known agent identifiers.
    pub agent_ids: Vec<String>,
    /// Route-keyed agent overrides. Keys are `channel`,
    /// `channel:accountID`, or `channel:accountID:peerID`.
    pub route_agent_map: BTreeMap<String, String>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            default_agent_id: "main".to_string(),
            workspace_root: "~/.reefbot/workspace".to_string(),
            agent_ids: vec!["main".to_string()],
            route_agent_map: BTreeMap::new(),
        }
    }
}

impl AgentsConfig {
    /// Resolve the agent for a route, most-specific key first:
    /// `channel:account:peer`, then `channel:account`, then `channel`,
    /// then the default agent.
    pub fn resolved_agent_id(&self, route: &Route) -> String {
        let mut candidates = Vec::new();
        if let (Some(account), Some(peer)) = (&route.account_id, &route.peer_id) {
            candidates.push(format!("{}:{}:{}", route.channel, account, peer));
        }
        if let Some(account) = &route.account_id {
            candidates.push(format!("{}:{}", route.channel, account));
        }
        candidates.push(route.channel.clone());

        for key in candidates {
            if let Some(agent) = self.route_agent_map.get(&key) {
                return agent.clone();
            }
        }
        self.default_agent_id.clone()
    }

    /// Reject malformed route-map keys (empty or with empty segments, or
    /// more than three segments).
    pub fn validate(&self) -> Result<(), EngineError> {
        for key in self.route_agent_map.keys() {
            let segments: Vec<&str> = key.split(':').collect();
            if key.is_empty()
                || segments.len() > 3
                || segments.iter().any(|s| s.is_empty())
            {
                return Err(EngineError::InvalidConfiguration(format!(
                    "malformed route key in routeAgentMap: {key:?}"
                )));
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────
// Routing
// ─────────────────────────────────────────────

/// Session-key derivation flags. All inclusion flags default to `true`;
/// disabling all of them collapses every conversation into one shared
/// session (flagged by the security audit).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoutingConfig {
    pub default_session_key: String,
    pub include_channel_id: bool,
    pub include_account_id: bool,
    pub include_peer_id: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_session_key: "main".to_string(),
            include_channel_id: true,
            include_account_id: true,
            include_peer_id: true,
        }
    }
}

// ─────────────────────────────────────────────
// Channels
// ─────────────────────────────────────────────

/// All channel adapter configurations.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelsConfig {
    pub discord: DiscordChannelConfig,
    pub telegram: TelegramChannelConfig,
    pub whatsapp_cloud: WhatsAppCloudConfig,
}

/// Discord adapter config (REST polling).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscordChannelConfig {
    pub enabled: bool,
    pub bot_token: String,
    /// Guild channels to poll for messages.
    pub channel_ids: Vec<String>,
    pub poll_interval_ms: u64,
    /// Accept guild messages only when the bot is mentioned.
    pub mention_only: bool,
    pub presence_enabled: bool,
}

impl Default for DiscordChannelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: String::new(),
            channel_ids: Vec::new(),
            poll_interval_ms: 2000,
            mention_only: true,
            presence_enabled: false,
        }
    }
}

/// Telegram adapter config (getUpdates polling).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelegramChannelConfig {
    pub enabled: bool,
    pub bot_token: String,
    pub poll_interval_ms: u64,
    /// Accept group messages only when the bot is mentioned.
    pub mention_only: bool,
}

impl Default for TelegramChannelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: String::new(),
            poll_interval_ms: 2000,
            mention_only: true,
        }
    }
}

/// WhatsApp Cloud API adapter config (webhook ingress, Graph send).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WhatsAppCloudConfig {
    pub enabled: bool,
    pub access_token: String,
    pub phone_number_id: String,
    pub verify_token: String,
}

// ─────────────────────────────────────────────
// Models
// ─────────────────────────────────────────────

/// Model provider directory configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelsConfig {
    /// Provider used when a request names none. The echo provider is always
    /// registered, so `"echo"` is a safe default.
    pub default_provider_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub open_ai: ProviderSectionConfig,
    pub open_ai_compatible: ProviderSectionConfig,
    pub anthropic: ProviderSectionConfig,
    pub gemini: ProviderSectionConfig,
    pub foundation: ProviderSectionConfig,
    pub local: LocalModelConfig,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default_provider_id: "echo".to_string(),
            system_prompt: None,
            open_ai: ProviderSectionConfig::default(),
            open_ai_compatible: ProviderSectionConfig::default(),
            anthropic: ProviderSectionConfig::default(),
            gemini: ProviderSectionConfig::default(),
            foundation: ProviderSectionConfig::default(),
            local: LocalModelConfig::default(),
        }
    }
}

impl ModelsConfig {
    /// The enumerated `(field, apiKey)` pairs the security audit inspects.
    pub fn secret_fields(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("models.openAI.apiKey", self.open_ai.api_key.as_str()),
            (
                "models.openAICompatible.apiKey",
                self.open_ai_compatible.api_key.as_str(),
            ),
            ("models.anthropic.apiKey", self.anthropic.api_key.as_str()),
            ("models.gemini.apiKey", self.gemini.api_key.as_str()),
            ("models.foundation.apiKey", self.foundation.api_key.as_str()),
        ]
    }
}

/// One hosted-provider section.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderSectionConfig {
    pub enabled: bool,
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    pub model: String,
}

/// Local in-process model runtime section.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalModelConfig {
    pub enabled: bool,
    pub model_path: String,
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.agents.default_agent_id, "main");
        assert_eq!(config.routing.default_session_key, "main");
        assert!(config.routing.include_channel_id);
        assert!(config.routing.include_peer_id);
        assert_eq!(config.models.default_provider_id, "echo");
        assert_eq!(config.gateway.auth_mode, "token");
        assert!(!config.channels.discord.enabled);
        assert!(!config.channels.telegram.enabled);
        assert!(!config.channels.whatsapp_cloud.enabled);
    }

    #[test]
    fn test_config_from_json_camel_case() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "agents": {
                "defaultAgentId": "support",
                "routeAgentMap": {"discord": "support"}
            },
            "routing": {
                "includePeerId": false
            },
            "channels": {
                "telegram": {"enabled": true, "botToken": "bot123:ABC"}
            }
        }))
        .unwrap();

        assert_eq!(config.agents.default_agent_id, "support");
        assert_eq!(
            config.agents.route_agent_map.get("discord").map(String::as_str),
            Some("support")
        );
        assert!(!config.routing.include_peer_id);
        // Defaults preserved for the untouched flags
        assert!(config.routing.include_channel_id);
        assert!(config.channels.telegram.enabled);
        assert_eq!(config.channels.telegram.bot_token, "bot123:ABC");
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "futureSection": {"anything": true},
            "gateway": {"host": "0.0.0.0", "futureField": 1}
        }))
        .unwrap();

        assert_eq!(config.gateway.host, "0.0.0.0");
        assert_eq!(config.gateway.port, 18790);
    }

    #[test]
    fn test_empty_json_gives_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.agents.default_agent_id, "main");
        assert_eq!(config.channels.discord.poll_interval_ms, 2000);
        assert!(config.channels.discord.mention_only);
    }

    #[test]
    fn test_round_trip_with_defaults_applied_twice() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let decoded: Config = serde_json::from_str(&json).unwrap();
        let json_again = serde_json::to_string(&decoded).unwrap();
        assert_eq!(json, json_again);
    }

    #[test]
    fn test_resolved_agent_id_specificity() {
        let mut agents = AgentsConfig::default();
        agents
            .route_agent_map
            .insert("discord".into(), "guild-agent".into());
        agents
            .route_agent_map
            .insert("discord:acct".into(), "acct-agent".into());
        agents
            .route_agent_map
            .insert("discord:acct:peer".into(), "peer-agent".into());

        let full = Route {
            channel: "discord".into(),
            account_id: Some("acct".into()),
            peer_id: Some("peer".into()),
        };
        assert_eq!(agents.resolved_agent_id(&full), "peer-agent");

        let account_only = Route {
            channel: "discord".into(),
            account_id: Some("acct".into()),
            peer_id: Some("other".into()),
        };
        // No channel:acct:other entry → falls back to channel:acct
        assert_eq!(agents.resolved_agent_id(&account_only), "acct-agent");

        let channel_only = Route::new("discord", "whatever");
        assert_eq!(agents.resolved_agent_id(&channel_only), "guild-agent");

        let unmapped = Route::new("telegram", "x");
        assert_eq!(agents.resolved_agent_id(&unmapped), "main");
    }

    #[test]
    fn test_validate_rejects_malformed_route_keys() {
        let mut agents = AgentsConfig::default();
        agents.route_agent_map.insert("discord::peer".into(), "a".into());
        assert!(agents.validate().is_err());

        let mut agents = AgentsConfig::default();
        agents
            .route_agent_map
            .insert("a:b:c:d".into(), "too-deep".into());
        assert!(agents.validate().is_err());

        let mut agents = AgentsConfig::default();
        agents.route_agent_map.insert("discord:acct".into(), "ok".into());
        assert!(agents.validate().is_ok());
    }

    #[test]
    fn test_models_secret_fields() {
        let mut models = ModelsConfig::default();
        models.anthropic.api_key = "sk-ant-xyz".into();

        let non_empty: Vec<&str> = models
            .secret_fields()
            .into_iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, _)| k)
            .collect();
        assert_eq!(non_empty, vec!["models.anthropic.apiKey"]);
    }
}
