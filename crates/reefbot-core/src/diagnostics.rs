//! Runtime diagnostics — bounded event ring plus rolling usage counters.
//!
//! Every subsystem emits structured [`DiagnosticEvent`]s into one shared
//! [`DiagnosticsPipeline`]. The pipeline keeps the most recent events in a
//! FIFO ring (default 500) and updates aggregate counters selected by
//! `(subsystem, name)` as events arrive.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

/// Default event ring capacity.
pub const DEFAULT_EVENT_LIMIT: usize = 500;

/// One structured diagnostic event.
#[derive(Clone, Debug)]
pub struct DiagnosticEvent {
    pub subsystem: String,
    pub name: String,
    pub run_id: Option<String>,
    pub session_key: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub metadata: BTreeMap<String, String>,
}

impl DiagnosticEvent {
    /// Create a new event.
    pub fn new(subsystem: impl Into<String>, name: impl Into<String>) -> Self {
        DiagnosticEvent {
            subsystem: subsystem.into(),
            name: name.into(),
            run_id: None,
            session_key: None,
            occurred_at: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// Shorthand for a `runtime` subsystem event.
    pub fn runtime(name: impl Into<String>) -> Self {
        Self::new("runtime", name)
    }

    /// Shorthand for a `channel` subsystem event.
    pub fn channel(name: impl Into<String>) -> Self {
        Self::new("channel", name)
    }

    /// Shorthand for a `security` subsystem event.
    pub fn security(name: impl Into<String>) -> Self {
        Self::new("security", name)
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_session_key(mut self, session_key: impl Into<String>) -> Self {
        self.session_key = Some(session_key.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    fn meta_is_true(&self, key: &str) -> bool {
        self.metadata.get(key).map(String::as_str) == Some("true")
    }
}

/// Aggregate counters rolled up from recorded events.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UsageSnapshot {
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_failed: u64,
    pub runs_timed_out: u64,
    pub model_calls: u64,
    pub model_failures: u64,
    pub skill_invocations: u64,
    pub deliveries_sent: u64,
    pub deliveries_failed: u64,
    pub run_latency_total_ms: u64,
    pub per_provider: BTreeMap<String, u64>,
    pub per_skill: BTreeMap<String, u64>,
    pub per_channel: BTreeMap<String, u64>,
}

impl UsageSnapshot {
    /// Mean completed-run latency; the divisor is clamped so an empty
    /// snapshot reports zero instead of dividing by zero.
    pub fn average_run_latency_ms(&self) -> u64 {
        self.run_latency_total_ms / self.runs_completed.max(1)
    }

    /// One-line summary for the built-in status surfaces.
    pub fn summary_line(&self) -> String {
        format!(
            "runs {}/{} ok ({} failed, {} timed out), model calls {} ({} failed), skills {}, deliveries {} sent / {} failed",
            self.runs_completed,
            self.runs_started,
            self.runs_failed,
            self.runs_timed_out,
            self.model_calls,
            self.model_failures,
            self.skill_invocations,
            self.deliveries_sent,
            self.deliveries_failed,
        )
    }
}

/// A callable that accepts events; handed to components that only emit.
pub type DiagnosticSink = Arc<dyn Fn(DiagnosticEvent) + Send + Sync>;

struct Inner {
    ring: VecDeque<DiagnosticEvent>,
    limit: usize,
    usage: UsageSnapshot,
}

/// Bounded ring of events plus incremental counters.
pub struct DiagnosticsPipeline {
    inner: Mutex<Inner>,
}

impl Default for DiagnosticsPipeline {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_LIMIT)
    }
}

impl DiagnosticsPipeline {
    /// Create a pipeline with the given ring capacity.
    pub fn new(limit: usize) -> Self {
        DiagnosticsPipeline {
            inner: Mutex::new(Inner {
                ring: VecDeque::new(),
                limit: limit.max(1),
                usage: UsageSnapshot::default(),
            }),
        }
    }

    /// Record an event: append, trim from the front when over capacity,
    /// update aggregates.
    pub fn record(&self, event: DiagnosticEvent) {
        let mut inner = self.inner.lock().unwrap();
        Self::update_usage(&mut inner.usage, &event);
        inner.ring.push_back(event);
        while inner.ring.len() > inner.limit {
            inner.ring.pop_front();
        }
    }

    /// The most recent `limit` events, oldest first.
    pub fn recent_events(&self, limit: usize) -> Vec<DiagnosticEvent> {
        let inner = self.inner.lock().unwrap();
        let skip = inner.ring.len().saturating_sub(limit);
        inner.ring.iter().skip(skip).cloned().collect()
    }

    /// Copy of the aggregate counters.
    pub fn usage_snapshot(&self) -> UsageSnapshot {
        self.inner.lock().unwrap().usage.clone()
    }

    /// Clear the ring and counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.ring.clear();
        inner.usage = UsageSnapshot::default();
    }

    /// A cloneable sink that records into this pipeline.
    pub fn sink(self: &Arc<Self>) -> DiagnosticSink {
        let pipeline = Arc::clone(self);
        Arc::new(move |event| pipeline.record(event))
    }

    fn update_usage(usage: &mut UsageSnapshot, event: &DiagnosticEvent) {
        match (event.subsystem.as_str(), event.name.as_str()) {
            ("runtime", "run.started") => usage.runs_started += 1,
            ("runtime", "run.completed") => {
                usage.runs_completed += 1;
                if let Some(latency) = event.metadata.get("latencyMs") {
                    usage.run_latency_total_ms += latency.parse::<u64>().unwrap_or(0);
                }
            }
            ("runtime", "run.failed") => {
                usage.runs_failed += 1;
                if event.meta_is_true("timedOut") {
                    usage.runs_timed_out += 1;
                }
            }
            ("runtime", "model.call.started") => usage.model_calls += 1,
            ("runtime", "model.call.completed") => {
                if let Some(provider) = event.metadata.get("providerID") {
                    *usage.per_provider.entry(provider.clone()).or_insert(0) += 1;
                }
            }
            ("runtime", "model.call.failed") => {
                usage.model_failures += 1;
                if let Some(provider) = event.metadata.get("providerID") {
                    *usage.per_provider.entry(provider.clone()).or_insert(0) += 1;
                }
            }
            ("channel", "skill.invoked") => {
                usage.skill_invocations += 1;
                if let Some(skill) = event.metadata.get("skillName") {
                    *usage.per_skill.entry(skill.clone()).or_insert(0) += 1;
                }
            }
            ("channel", "outbound.sent") => {
                usage.deliveries_sent += 1;
                if let Some(channel) = event.metadata.get("channel") {
                    *usage.per_channel.entry(channel.clone()).or_insert(0) += 1;
                }
            }
            ("channel", "outbound.failed") => {
                usage.deliveries_failed += 1;
                if let Some(channel) = event.metadata.get("channel") {
                    *usage.per_channel.entry(channel.clone()).or_insert(0) += 1;
                }
            }
            _ => {}
        }
    }
}
