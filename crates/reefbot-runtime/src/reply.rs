//! Auto-reply engine — one inbound message to exactly one outbound reply.
//!
//! Orchestration for a non-empty inbound:
//! 1. derive the session key, resolve the agent, upsert the session record
//! 2. append the user turn to conversation memory
//! 3. attempt skill invocation (explicit failures surface, implicit ones
//!    are swallowed)
//! 4. compose the prompt from bootstrap context, the skill snapshot,
//!    escaped memory context, skill output, and the new user message
//! 5. run the agent under the auto-reply timeout
//! 6. append the assistant turn and deliver through the channel registry
//!
//! Built-in `/health`, `/status`, and `/help` are answered straight from
//! the diagnostics pipeline — no model call, no memory append.

use std::sync::Arc;

use tracing::{debug, warn};

use reefbot_channels::ChannelRegistry;
use reefbot_core::bootstrap::BootstrapContextLoader;
use reefbot_core::config::schema::{AgentsConfig, RoutingConfig};
use reefbot_core::routing::derive_session_key;
use reefbot_core::{
    ConversationMemoryStore, DiagnosticEvent, DiagnosticsPipeline, EngineError, InboundMessage,
    OutboundMessage, SessionStore,
};
use reefbot_skills::SkillInvocationEngine;

use crate::runtime::{AgentRuntime, RunRequest};

/// Auto-reply tunables.
#[derive(Clone, Debug)]
pub struct AutoReplyConfig {
    /// Deadline for one reply generation.
    pub auto_reply_timeout_ms: u64,
    /// Turns of conversation memory injected into the prompt.
    pub memory_context_limit: usize,
}

impl Default for AutoReplyConfig {
    fn default() -> Self {
        Self {
            auto_reply_timeout_ms: 30_000,
            memory_context_limit: 12,
        }
    }
}

/// Orchestrates inbound → session → skills → prompt → model → outbound.
pub struct AutoReplyEngine {
    routing: RoutingConfig,
    agents: AgentsConfig,
    sessions: Arc<SessionStore>,
    memory: Option<Arc<ConversationMemoryStore>>,
    skills: Option<Arc<SkillInvocationEngine>>,
    bootstrap: Option<BootstrapContextLoader>,
    runtime: Arc<AgentRuntime>,
    registry: Arc<ChannelRegistry>,
    pipeline: Arc<DiagnosticsPipeline>,
    config: AutoReplyConfig,
}

impl AutoReplyEngine {
    pub fn new(
        routing: RoutingConfig,
        agents: AgentsConfig,
        sessions: Arc<SessionStore>,
        runtime: Arc<AgentRuntime>,
        registry: Arc<ChannelRegistry>,
        pipeline: Arc<DiagnosticsPipeline>,
    ) -> Self {
        AutoReplyEngine {
            routing,
            agents,
            sessions,
            memory: None,
            skills: None,
            bootstrap: None,
            runtime,
            registry,
            pipeline,
            config: AutoReplyConfig::default(),
        }
    }

    pub fn with_memory(mut self, memory: Arc<ConversationMemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_skills(mut self, skills: Arc<SkillInvocationEngine>) -> Self {
        self.skills = Some(skills);
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: BootstrapContextLoader) -> Self {
        self.bootstrap = Some(bootstrap);
        self
    }

    pub fn with_config(mut self, config: AutoReplyConfig) -> Self {
        self.config = config;
        self
    }

    /// Process one inbound message into exactly one outbound reply.
    pub async fn process(&self, inbound: &InboundMessage) -> Result<OutboundMessage, EngineError> {
        self.pipeline.record(
            DiagnosticEvent::channel("inbound.received")
                .with_meta("channel", inbound.channel.clone()),
        );

        let text = inbound.text.trim().to_string();
        if text.is_empty() {
            self.pipeline.record(
                DiagnosticEvent::channel("outbound.skipped")
                    .with_meta("channel", inbound.channel.clone())
                    .with_meta("reason", "empty"),
            );
            return Ok(OutboundMessage::reply_to(inbound, ""));
        }

        let route = inbound.route();
        let session_key = derive_session_key(&self.routing, &route, None);
        let agent_id = self.agents.resolved_agent_id(&route);
        self.sessions
            .resolve_or_create(&session_key, &agent_id, Some(&route));
        self.pipeline.record(
            DiagnosticEvent::channel("routing.session_resolved")
                .with_session_key(session_key.clone())
                .with_meta("sessionKey", session_key.clone())
                .with_meta("agentID", agent_id.clone()),
        );

        // Built-in command surface: answered from diagnostics, never from
        // the model, and without touching conversation memory.
        if let Some(reply) = self.builtin_reply(&text) {
            let outbound = OutboundMessage::reply_to(inbound, reply);
            self.deliver(&outbound).await;
            return Ok(outbound);
        }

        if let Some(memory) = &self.memory {
            memory.append_user_turn(&session_key, &route, &text);
        }

        let mut skill_output: Option<(String, String)> = None;
        if let Some(skills) = &self.skills {
            if let Some(invocation) = skills.invoke_if_requested(&text).await {
                match (invocation.explicit, invocation.result) {
                    (_, Ok(outcome)) => {
                        let mut event = DiagnosticEvent::channel("skill.invoked")
                            .with_session_key(session_key.clone())
                            .with_meta("skillName", outcome.skill_name.clone());
                        if let Some(duration) = outcome.duration_ms {
                            event = event.with_meta("durationMs", duration.to_string());
                        }
                        if let Some(executor) = &outcome.executor_id {
                            event = event.with_meta("executorID", executor.clone());
                        }
                        self.pipeline.record(event);
                        skill_output = Some((outcome.skill_name, outcome.output));
                    }
                    (true, Err(e)) => {
                        // Explicit slash commands surface their failures
                        return Ok(self.deliver_error(inbound, e).await);
                    }
                    (false, Err(_)) => {
                        // Implicit matches must not poison unrelated replies
                        debug!("implicit skill failure swallowed");
                    }
                }
            }
        }

        let prompt = self.compose_prompt(&session_key, &text, skill_output.as_ref());

        let mut request = RunRequest::new(session_key.clone(), prompt.clone());
        request.agent_id = agent_id;

        let output = match self
            .runtime
            .run(request, self.config.auto_reply_timeout_ms)
            .await
        {
            Ok(output) => output,
            Err(e) => return Ok(self.deliver_error(inbound, e).await),
        };

        // An echo of the composed prompt means the model added nothing:
        // acknowledge instead, unless skill output should stay visible.
        let reply_text = if skill_output.is_none() && output.text == prompt {
            "OK".to_string()
        } else {
            output.text
        };

        if let Some(memory) = &self.memory {
            memory.append_assistant_turn(&session_key, &route, &reply_text);
            if let Err(e) = memory.save() {
                warn!(error = %e, "failed to persist conversation memory");
            }
        }

        let outbound = OutboundMessage::reply_to(inbound, reply_text);
        self.deliver(&outbound).await;
        Ok(outbound)
    }

    /// Send through the registry; delivery failures are recorded by the
    /// registry's own events and do not change the reply value.
    async fn deliver(&self, outbound: &OutboundMessage) {
        if let Err(e) = self.registry.send(outbound).await {
            warn!(channel = %outbound.channel, error = %e, "outbound delivery failed");
        }
    }

    /// Convert an engine error into the system error reply.
    async fn deliver_error(&self, inbound: &InboundMessage, error: EngineError) -> OutboundMessage {
        let outbound = OutboundMessage::reply_to(inbound, format!("Error: {error}"));
        self.deliver(&outbound).await;
        outbound
    }

    fn builtin_reply(&self, text: &str) -> Option<String> {
        match text {
            "/health" => {
                let snapshots = self.registry.all_health_snapshots();
                let healthy = snapshots
                    .iter()
                    .filter(|s| s.consecutive_failures == 0)
                    .count();
                let channels: Vec<String> = snapshots
                    .iter()
                    .map(|s| format!("{} {}", s.channel_id, s.status.as_str()))
                    .collect();
                Some(format!(
                    "{healthy}/{} channels healthy ({}); {}",
                    snapshots.len(),
                    channels.join(", "),
                    self.pipeline.usage_snapshot().summary_line(),
                ))
            }
            "/status" => Some(self.pipeline.usage_snapshot().summary_line()),
            "/help" => Some(
                "Commands: /health, /status, /help. Anything else is answered by the agent."
                    .to_string(),
            ),
            _ => None,
        }
    }

    fn compose_prompt(
        &self,
        session_key: &str,
        text: &str,
        skill_output: Option<&(String, String)>,
    ) -> String {
        let mut sections: Vec<String> = Vec::new();

        if let Some(bootstrap) = &self.bootstrap {
            let context = bootstrap.load();
            if !context.is_empty() {
                sections.push(format!("## Workspace Bootstrap Context\n{context}"));
            }
        }

        if let Some(skills) = &self.skills {
            let snapshot = skills.prompt_snapshot();
            if !snapshot.is_empty() {
                sections.push(snapshot);
            }
        }

        if let Some(memory) = &self.memory {
            let context =
                memory.formatted_context(session_key, self.config.memory_context_limit);
            if !context.is_empty() {
                sections.push(context);
            }
        }

        if let Some((name, output)) = skill_output {
            sections.push(format!("## Skill Output ({name})\n{output}"));
        }

        sections.push(format!("## New User Message\n{text}"));
        sections.join("\n\n")
    }
}
