//! Session-key derivation.
//!
//! A session key identifies one conversation thread for routing and memory.
//! Grammar: `segment ":" segment { ":" segment }` where segments are built
//! from the sanitized route parts selected by [`RoutingConfig`].

use crate::config::schema::RoutingConfig;
use crate::types::Route;

/// Sanitize one key segment: trim, then replace `' '`, `'/'`, `':'`
/// with `'_'`.
pub fn sanitize_segment(raw: &str) -> String {
    raw.trim().replace([' ', '/', ':'], "_")
}

/// Derive the session key for a route.
///
/// An explicit caller-supplied key wins when non-empty. Otherwise the
/// selected route parts are sanitized, empties dropped, and the remainder
/// joined with `':'`. An empty result falls back to the sanitized default
/// key.
pub fn derive_session_key(
    config: &RoutingConfig,
    route: &Route,
    explicit_key: Option<&str>,
) -> String {
    if let Some(key) = explicit_key {
        let key = key.trim();
        if !key.is_empty() {
            return key.to_string();
        }
    }

    let mut parts: Vec<String> = Vec::new();
    if config.include_channel_id {
        parts.push(sanitize_segment(&route.channel));
    }
    if config.include_account_id {
        if let Some(account) = &route.account_id {
            parts.push(sanitize_segment(account));
        }
    }
    if config.include_peer_id {
        if let Some(peer) = &route.peer_id {
            parts.push(sanitize_segment(peer));
        }
    }
    parts.retain(|p| !p.is_empty());

    if parts.is_empty() {
        let fallback = sanitize_segment(&config.default_session_key);
        if fallback.is_empty() {
            "main".to_string()
        } else {
            fallback
        }
    } else {
        parts.join(":")
    }
}
