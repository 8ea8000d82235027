//! Channel registry — outbound routing with retry, throttle, and health.
//!
//! The registry owns delivery policy so adapters stay transport-only:
//! - retries with exponential backoff per the configured [`RetryPolicy`]
//! - per-channel throttling (delay, or drop with a diagnostic)
//! - health snapshots with the transition rules
//!   `0 failures → healthy`, `1..N-1 → degraded`, `≥ N → offline`
//!
//! Every outbound attempt ends in exactly one `channel.outbound.sent` or
//! `channel.outbound.failed` event carrying the attempt count.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use reefbot_core::{DiagnosticEvent, DiagnosticSink, EngineError, OutboundMessage};

use crate::adapter::ChannelAdapter;

/// Retry policy for outbound sends.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 50,
            multiplier: 2.0,
            max_backoff_ms: 2000,
        }
    }
}

impl RetryPolicy {
    /// Backoff before the given retry (1-based attempt that just failed).
    fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let ms = (self.initial_backoff_ms as f64 * factor) as u64;
        Duration::from_millis(ms.min(self.max_backoff_ms))
    }
}

/// Per-channel send throttle.
#[derive(Clone, Debug, Default)]
pub struct ThrottlePolicy {
    /// Minimum spacing between sends; zero disables throttling.
    pub min_interval_ms: u64,
    /// Drop early sends instead of delaying them.
    pub drop_if_overflow: bool,
}

/// Channel delivery status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelStatus {
    Healthy,
    Degraded,
    Offline,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Healthy => "healthy",
            ChannelStatus::Degraded => "degraded",
            ChannelStatus::Offline => "offline",
        }
    }
}

/// Point-in-time health of one channel.
#[derive(Clone, Debug)]
pub struct HealthSnapshot {
    pub channel_id: String,
    pub status: ChannelStatus,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default)]
struct HealthState {
    consecutive_failures: u32,
    last_error: Option<String>,
    last_success_at: Option<DateTime<Utc>>,
    last_failure_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct ThrottleState {
    policy: ThrottlePolicy,
    last_send: Option<Instant>,
}

/// Default consecutive-failure count at which a channel goes offline.
pub const DEFAULT_OFFLINE_THRESHOLD: u32 = 3;

/// Routes outbound messages to adapters and tracks per-channel health.
pub struct ChannelRegistry {
    adapters: RwLock<HashMap<String, Arc<dyn ChannelAdapter>>>,
    retry: RetryPolicy,
    offline_threshold: u32,
    health: Mutex<HashMap<String, HealthState>>,
    throttles: Mutex<HashMap<String, ThrottleState>>,
    sink: DiagnosticSink,
}

impl ChannelRegistry {
    pub fn new(sink: DiagnosticSink) -> Self {
        ChannelRegistry {
            adapters: RwLock::new(HashMap::new()),
            retry: RetryPolicy::default(),
            offline_threshold: DEFAULT_OFFLINE_THRESHOLD,
            health: Mutex::new(HashMap::new()),
            throttles: Mutex::new(HashMap::new()),
            sink,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_offline_threshold(mut self, threshold: u32) -> Self {
        self.offline_threshold = threshold.max(1);
        self
    }

    /// Register an adapter. Fails if the channel ID is already present.
    pub fn register(&self, adapter: Arc<dyn ChannelAdapter>) -> Result<(), EngineError> {
        let id = adapter.id().to_string();
        let mut adapters = self.adapters.write().unwrap();
        if adapters.contains_key(&id) {
            return Err(EngineError::InvalidConfiguration(format!(
                "channel already registered: {id}"
            )));
        }
        info!(channel = %id, "registered channel adapter");
        adapters.insert(id.clone(), adapter);
        self.health.lock().unwrap().insert(id, HealthState::default());
        Ok(())
    }

    /// Set the throttle policy for one channel.
    pub fn set_throttle(&self, channel_id: &str, policy: ThrottlePolicy) {
        self.throttles
            .lock()
            .unwrap()
            .entry(channel_id.to_string())
            .or_default()
            .policy = policy;
    }

    /// Registered channel IDs, sorted.
    pub fn channel_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.adapters.read().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// The configured retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.clone()
    }

    /// Start every registered adapter, recording health per outcome.
    pub async fn start_all(&self) {
        let adapters: Vec<Arc<dyn ChannelAdapter>> =
            self.adapters.read().unwrap().values().cloned().collect();
        for adapter in adapters {
            match adapter.start().await {
                Ok(()) => self.mark_success(adapter.id()),
                Err(e) => {
                    error!(channel = %adapter.id(), error = %e, "channel start failed");
                    self.mark_failure(adapter.id(), &e);
                }
            }
        }
    }

    /// Stop every registered adapter.
    pub async fn stop_all(&self) {
        let adapters: Vec<Arc<dyn ChannelAdapter>> =
            self.adapters.read().unwrap().values().cloned().collect();
        for adapter in adapters {
            if let Err(e) = adapter.stop().await {
                warn!(channel = %adapter.id(), error = %e, "channel stop failed");
            }
        }
    }

    /// Deliver one outbound message under the retry policy.
    pub async fn send(&self, outbound: &OutboundMessage) -> Result<(), EngineError> {
        let adapter = self
            .adapters
            .read()
            .unwrap()
            .get(&outbound.channel)
            .cloned()
            .ok_or_else(|| {
                EngineError::InvalidConfiguration(format!(
                    "no adapter registered for channel {}",
                    outbound.channel
                ))
            })?;

        if !self.pass_throttle(&outbound.channel).await {
            debug!(channel = %outbound.channel, "outbound dropped by throttle");
            (self.sink)(
                DiagnosticEvent::channel("overflow.dropped")
                    .with_meta("channel", outbound.channel.clone()),
            );
            return Ok(());
        }

        let mut attempts = 0u32;
        let mut last_err: Option<EngineError> = None;

        while attempts < self.retry.max_attempts {
            attempts += 1;
            match adapter.send(outbound).await {
                Ok(()) => {
                    self.mark_success(&outbound.channel);
                    (self.sink)(
                        DiagnosticEvent::channel("outbound.sent")
                            .with_meta("channel", outbound.channel.clone())
                            .with_meta("attempts", attempts.to_string())
                            .with_meta("status", self.status_of(&outbound.channel).as_str()),
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        channel = %outbound.channel,
                        attempt = attempts,
                        error = %e,
                        "outbound send attempt failed"
                    );
                    // Authentication failures are not transient; retrying
                    // the same credentials cannot succeed.
                    let fatal = e.is_authentication();
                    last_err = Some(e);
                    if fatal {
                        break;
                    }
                    if attempts < self.retry.max_attempts {
                        tokio::time::sleep(self.retry.backoff_for(attempts)).await;
                    }
                }
            }
        }

        let err = last_err
            .unwrap_or_else(|| EngineError::Unavailable("send failed with no attempts".into()));
        self.mark_failure(&outbound.channel, &err);
        (self.sink)(
            DiagnosticEvent::channel("outbound.failed")
                .with_meta("channel", outbound.channel.clone())
                .with_meta("attempts", attempts.to_string())
                .with_meta("status", self.status_of(&outbound.channel).as_str()),
        );
        Err(err)
    }

    /// Health snapshots for all channels, sorted by channel ID.
    pub fn all_health_snapshots(&self) -> Vec<HealthSnapshot> {
        let health = self.health.lock().unwrap();
        let mut snapshots: Vec<HealthSnapshot> = health
            .iter()
            .map(|(id, state)| HealthSnapshot {
                channel_id: id.clone(),
                status: self.status_for_failures(state.consecutive_failures),
                consecutive_failures: state.consecutive_failures,
                last_error: state.last_error.clone(),
                last_success_at: state.last_success_at,
                last_failure_at: state.last_failure_at,
            })
            .collect();
        snapshots.sort_by(|a, b| a.channel_id.cmp(&b.channel_id));
        snapshots
    }

    fn status_for_failures(&self, failures: u32) -> ChannelStatus {
        if failures == 0 {
            ChannelStatus::Healthy
        } else if failures < self.offline_threshold {
            ChannelStatus::Degraded
        } else {
            ChannelStatus::Offline
        }
    }

    fn status_of(&self, channel_id: &str) -> ChannelStatus {
        let health = self.health.lock().unwrap();
        let failures = health
            .get(channel_id)
            .map(|s| s.consecutive_failures)
            .unwrap_or(0);
        self.status_for_failures(failures)
    }

    fn mark_success(&self, channel_id: &str) {
        let mut health = self.health.lock().unwrap();
        let state = health.entry(channel_id.to_string()).or_default();
        state.consecutive_failures = 0;
        state.last_error = None;
        state.last_success_at = Some(Utc::now());
    }

    fn mark_failure(&self, channel_id: &str, err: &EngineError) {
        let mut health = self.health.lock().unwrap();
        let state = health.entry(channel_id.to_string()).or_default();
        state.consecutive_failures += 1;
        state.last_error = Some(err.to_string());
        state.last_failure_at = Some(Utc::now());
    }

    /// Returns false when the send should be dropped. Delays when the
    /// policy allows it.
    async fn pass_throttle(&self, channel_id: &str) -> bool {
        let wait = {
            let mut throttles = self.throttles.lock().unwrap();
            let state = throttles.entry(channel_id.to_string()).or_default();
            if state.policy.min_interval_ms == 0 {
                state.last_send = Some(Instant::now());
                return true;
            }

            let now = Instant::now();
            let min_interval = Duration::from_millis(state.policy.min_interval_ms);
            let wait = match state.last_send {
                Some(last) => min_interval.saturating_sub(now.duration_since(last)),
                None => Duration::ZERO,
            };

            if !wait.is_zero() && state.policy.drop_if_overflow {
                return false;
            }
            state.last_send = Some(now + wait);
            wait
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        true
    }
}
