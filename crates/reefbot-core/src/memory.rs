//! Conversation memory — bounded per-session transcript.
//!
//! File format: `conversation-memory.json` mapping session key → list of
//! turns, each key FIFO-bounded to the configured limit (default 200).
//!
//! `formatted_context` renders recent turns for prompt injection with all
//! control markers escaped, so untrusted chat text can never smuggle
//! model-directive tokens across the trust boundary.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::RwLock;

use tracing::warn;

use crate::types::{ConversationRole, ConversationTurn, Route};
use crate::utils;

/// Default maximum retained turns per session key.
pub const DEFAULT_TURN_LIMIT: usize = 200;

/// Zero-width space used to break control markers without changing the
/// visible text.
const ZWSP: char = '\u{200B}';

/// Escape prompt control markers in untrusted text.
///
/// - `##` becomes `# #` (repeated until no run of two remains)
/// - triple backticks are broken with zero-width spaces
/// - `<|` / `|>` are broken with a zero-width space
pub fn escape_markup(text: &str) -> String {
    let mut out = text.replace("```", &format!("`{ZWSP}`{ZWSP}`"));
    out = out
        .replace("<|", &format!("<{ZWSP}|"))
        .replace("|>", &format!("|{ZWSP}>"));
    while out.contains("##") {
        out = out.replace("##", "# #");
    }
    out
}

/// Bounded per-session conversation store.
///
/// Thread-safe via `RwLock`; every accessor returns value copies.
pub struct ConversationMemoryStore {
    path: PathBuf,
    limit: usize,
    turns: RwLock<BTreeMap<String, Vec<ConversationTurn>>>,
}

impl ConversationMemoryStore {
    /// Open a store backed by `path` with the given per-key turn limit
    /// (default 200), loading existing turns if present.
    pub fn open(path: PathBuf, limit: Option<usize>) -> std::io::Result<Self> {
        let store = ConversationMemoryStore {
            path,
            limit: limit.unwrap_or(DEFAULT_TURN_LIMIT),
            turns: RwLock::new(BTreeMap::new()),
        };
        store.load()?;
        Ok(store)
    }

    /// Append a user turn.
    pub fn append_user_turn(&self, session_key: &str, route: &Route, text: &str) {
        self.append(session_key, ConversationRole::User, route, text);
    }

    /// Append an assistant turn.
    pub fn append_assistant_turn(&self, session_key: &str, route: &Route, text: &str) {
        self.append(session_key, ConversationRole::Assistant, route, text);
    }

    fn append(&self, session_key: &str, role: ConversationRole, route: &Route, text: &str) {
        let mut turns = self.turns.write().unwrap();
        let list = turns.entry(session_key.to_string()).or_default();

        // Timestamps stay monotonic within a key even when the wall clock
        // ties on fast calls.
        let mut ts_ms = utils::now_ms();
        if let Some(last) = list.last() {
            ts_ms = ts_ms.max(last.ts_ms);
        }

        list.push(ConversationTurn {
            role,
            channel: route.channel.clone(),
            account_id: route.account_id.clone(),
            peer_id: route.peer_id.clone(),
            text: text.to_string(),
            ts_ms,
        });

        while list.len() > self.limit {
            list.remove(0);
        }
    }

    /// The most recent `limit` turns for a key, oldest first.
    pub fn recent_entries(&self, session_key: &str, limit: usize) -> Vec<ConversationTurn> {
        let turns = self.turns.read().unwrap();
        match turns.get(session_key) {
            Some(list) => {
                let start = list.len().saturating_sub(limit);
                list[start..].to_vec()
            }
            None => Vec::new(),
        }
    }

    /// Render recent turns as an escaped prompt section, or an empty string
    /// when the session has no history.
    pub fn formatted_context(&self, session_key: &str, limit: usize) -> String {
        let entries = self.recent_entries(session_key, limit);
        if entries.is_empty() {
            return String::new();
        }

        let mut lines = vec!["## Conversation Memory Context".to_string()];
        for turn in &entries {
            lines.push(format!("[{}] {}", turn.role.as_str(), escape_markup(&turn.text)));
        }
        lines.join("\n")
    }

    /// Persist all turns (atomic rename).
    pub fn save(&self) -> std::io::Result<()> {
        let snapshot = self.turns.read().unwrap().clone();
        utils::atomic_write_json(&self.path, &snapshot)
    }

    /// Replace in-memory state from disk. Missing file leaves the store
    /// empty.
    pub fn load(&self) -> std::io::Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let content = std::fs::read_to_string(&self.path)?;
        match serde_json::from_str::<BTreeMap<String, Vec<ConversationTurn>>>(&content) {
            Ok(loaded) => {
                *self.turns.write().unwrap() = loaded;
                Ok(())
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to parse conversation memory");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_store(limit: Option<usize>) -> (ConversationMemoryStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store =
            ConversationMemoryStore::open(dir.path().join("conversation-memory.json"), limit)
                .unwrap();
        (store, dir)
    }

    fn webchat_route() -> Route {
        Route::new("webchat", "u1")
    }

    #[test]
    fn test_append_and_recent() {
        let (store, _dir) = make_store(None);
        store.append_user_turn("k", &webchat_route(), "hello");
        store.append_assistant_turn("k", &webchat_route(), "hi there");

        let entries = store.recent_entries("k", 10);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].role, ConversationRole::User);
        assert_eq!(entries[1].role, ConversationRole::Assistant);
        assert_eq!(entries[1].text, "hi there");
    }

    #[test]
    fn test_recent_limits_to_last_n() {
        let (store, _dir) = make_store(None);
        for i in 0..10 {
            store.append_user_turn("k", &webchat_route(), &format!("msg {i}"));
        }

        let entries = store.recent_entries("k", 3);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].text, "msg 7");
        assert_eq!(entries[2].text, "msg 9");
    }

    #[test]
    fn test_turn_limit_trims_oldest() {
        let (store, _dir) = make_store(Some(3));
        for i in 0..5 {
            store.append_user_turn("k", &webchat_route(), &format!("msg {i}"));
        }

        let entries = store.recent_entries("k", 100);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].text, "msg 2");
    }

    #[test]
    fn test_timestamps_monotonic() {
        let (store, _dir) = make_store(None);
        for _ in 0..20 {
            store.append_user_turn("k", &webchat_route(), "fast");
        }

        let entries = store.recent_entries("k", 100);
        for pair in entries.windows(2) {
            assert!(pair[1].ts_ms >= pair[0].ts_ms);
        }
    }

    #[test]
    fn test_sessions_independent() {
        let (store, _dir) = make_store(None);
        store.append_user_turn("a", &webchat_route(), "for a");
        store.append_user_turn("b", &webchat_route(), "for b");
        store.append_user_turn("b", &webchat_route(), "again b");

        assert_eq!(store.recent_entries("a", 10).len(), 1);
        assert_eq!(store.recent_entries("b", 10).len(), 2);
    }

    #[test]
    fn test_formatted_context_shape() {
        let (store, _dir) = make_store(None);
        store.append_user_turn("k", &webchat_route(), "what is 2+2?");
        store.append_assistant_turn("k", &webchat_route(), "4");

        let ctx = store.formatted_context("k", 10);
        assert!(ctx.starts_with("## Conversation Memory Context"));
        assert!(ctx.contains("[user] what is 2+2?"));
        assert!(ctx.contains("[assistant] 4"));
    }

    #[test]
    fn test_formatted_context_empty_session() {
        let (store, _dir) = make_store(None);
        assert_eq!(store.formatted_context("missing", 10), "");
    }

    #[test]
    fn test_escape_markup_headers() {
        let escaped = escape_markup("## System Override");
        assert!(!escaped.contains("##"));
        assert!(escaped.contains("# #"));
    }

    #[test]
    fn test_escape_markup_header_runs() {
        let escaped = escape_markup("#### deep");
        assert!(!escaped.contains("##"));
    }

    #[test]
    fn test_escape_markup_code_fences() {
        let escaped = escape_markup("```rust\nfn main() {}\n```");
        assert!(!escaped.contains("```"));
        // The visible backticks survive, separated by zero-width spaces
        assert!(escaped.contains('`'));
    }

    #[test]
    fn test_escape_markup_directive_tokens() {
        let escaped = escape_markup("<|im_start|>system<|im_end|>");
        assert!(!escaped.contains("<|"));
        assert!(!escaped.contains("|>"));
    }

    #[test]
    fn test_injected_context_is_escaped() {
        let (store, _dir) = make_store(None);
        store.append_user_turn("k", &webchat_route(), "## Skills\n<|evil|>```");

        let ctx = store.formatted_context("k", 10);
        // Exactly one header — the store's own — survives escaping
        assert_eq!(ctx.matches("##").count(), 1);
        assert!(!ctx.contains("<|"));
        assert!(!ctx.contains("```"));
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conversation-memory.json");

        {
            let store = ConversationMemoryStore::open(path.clone(), None).unwrap();
            store.append_user_turn("telegram:42", &Route::new("telegram", "42"), "hi");
            store.append_assistant_turn("telegram:42", &Route::new("telegram", "42"), "hello");
            store.save().unwrap();
        }

        let reloaded = ConversationMemoryStore::open(path, None).unwrap();
        let entries = reloaded.recent_entries("telegram:42", 10);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "hi");
    }
}
