//! Session records and persistence.
//!
//! File format: a single `sessions.json` mapping session key →
//! `{key, agentId, updatedAtMs, lastRoute?}`. Writes go through an atomic
//! temp-file rename so readers never observe a partial file.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::Route;
use crate::utils;

/// One persisted session: the binding between a conversation thread and the
/// agent currently answering it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub key: String,
    pub agent_id: String,
    /// Monotonically non-decreasing per key.
    pub updated_at_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_route: Option<Route>,
}

/// Session store with in-memory state and JSON persistence.
///
/// Thread-safe via `RwLock` — multiple readers, exclusive writer. The
/// resolve-or-create upsert is the single write path, which keeps per-key
/// write order linearizable.
pub struct SessionStore {
    path: PathBuf,
    records: RwLock<BTreeMap<String, SessionRecord>>,
}

impl SessionStore {
    /// Open a store backed by `path`, loading existing records if present.
    pub fn open(path: PathBuf) -> std::io::Result<Self> {
        let store = SessionStore {
            path,
            records: RwLock::new(BTreeMap::new()),
        };
        store.load()?;
        Ok(store)
    }

    /// Resolve an existing session or create a new one.
    ///
    /// Existing records are re-bound to `agent_id` (route-mapping changes
    /// take effect on the next message), get a non-decreasing
    /// `updated_at_ms`, and have `last_route` updated when provided. The
    /// returned record is a value copy.
    pub fn resolve_or_create(
        &self,
        key: &str,
        agent_id: &str,
        route: Option<&Route>,
    ) -> SessionRecord {
        let now = utils::now_ms();
        let record = {
            let mut records = self.records.write().unwrap();
            let entry = records.entry(key.to_string()).or_insert_with(|| SessionRecord {
                key: key.to_string(),
                agent_id: agent_id.to_string(),
                updated_at_ms: now,
                last_route: route.cloned(),
            });

            entry.agent_id = agent_id.to_string();
            entry.updated_at_ms = entry.updated_at_ms.max(now);
            if let Some(route) = route {
                entry.last_route = Some(route.clone());
            }
            entry.clone()
        };

        if let Err(e) = self.save() {
            warn!(key = %key, error = %e, "failed to persist session store");
        }
        record
    }

    /// Get a copy of the record for a key.
    pub fn record_for_key(&self, key: &str) -> Option<SessionRecord> {
        self.records.read().unwrap().get(key).cloned()
    }

    /// All records, sorted by key.
    pub fn all_records(&self) -> Vec<SessionRecord> {
        self.records.read().unwrap().values().cloned().collect()
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    /// Whether the store has no sessions.
    pub fn is_empty(&self) -> bool {
        self.records.read().unwrap().is_empty()
    }

    /// Persist all records (atomic rename).
    pub fn save(&self) -> std::io::Result<()> {
        let snapshot = self.records.read().unwrap().clone();
        utils::atomic_write_json(&self.path, &snapshot)
    }

    /// Replace in-memory state from disk. Missing file leaves the store
    /// empty.
    pub fn load(&self) -> std::io::Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let loaded: BTreeMap<String, SessionRecord> = serde_json::from_str(&content)
            .map_err(std::io::Error::other)?;
        debug!(sessions = loaded.len(), "loaded session store");
        *self.records.write().unwrap() = loaded;
        Ok(())
    }
}
