//! Agent runtime — timeout-bounded runs with structured run events.
//!
//! Run pipeline: execute declared tool calls in order, call the model
//! router, emit `run.*` and `model.call.*` events. One deadline covers the
//! whole run as a two-task race; on deadline the pending operation is
//! abandoned cooperatively and the failure events carry `timedOut=true`.

use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{Stream, StreamExt};
use tracing::{debug, warn};

use reefbot_core::{DiagnosticEvent, DiagnosticsPipeline, EngineError};
use reefbot_providers::{GenerationPolicy, ModelRequest, ModelRouter};

use crate::tools::ToolRegistry;

/// One declared tool call, executed before the model call.
#[derive(Clone, Debug)]
pub struct ToolCallRequest {
    pub name: String,
    pub args: serde_json::Value,
}

/// A run request.
#[derive(Clone, Debug, Default)]
pub struct RunRequest {
    pub run_id: String,
    pub session_key: String,
    pub prompt: String,
    pub agent_id: String,
    pub model_provider_id: Option<String>,
    pub policy: Option<GenerationPolicy>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl RunRequest {
    /// New request with a fresh run ID.
    pub fn new(session_key: impl Into<String>, prompt: impl Into<String>) -> Self {
        RunRequest {
            run_id: uuid::Uuid::new_v4().to_string(),
            session_key: session_key.into(),
            prompt: prompt.into(),
            agent_id: "main".to_string(),
            model_provider_id: None,
            policy: None,
            tool_calls: Vec::new(),
        }
    }
}

/// Outcome of one declared tool call.
#[derive(Clone, Debug)]
pub struct ToolOutcome {
    pub name: String,
    pub result: Result<String, String>,
}

/// A completed run.
#[derive(Clone, Debug)]
pub struct RunOutput {
    pub run_id: String,
    pub session_key: String,
    pub text: String,
    pub provider_id: String,
    pub model_id: String,
    pub tool_outcomes: Vec<ToolOutcome>,
    pub latency_ms: u64,
}

/// One streamed run chunk; the terminator is the single final event.
#[derive(Clone, Debug, PartialEq)]
pub struct RunStreamEvent {
    pub run_id: String,
    pub session_key: String,
    pub text: String,
    pub is_final: bool,
}

/// The embedded agent runtime.
pub struct AgentRuntime {
    router: Arc<ModelRouter>,
    tools: ToolRegistry,
    pipeline: Arc<DiagnosticsPipeline>,
}

impl AgentRuntime {
    pub fn new(
        router: Arc<ModelRouter>,
        tools: ToolRegistry,
        pipeline: Arc<DiagnosticsPipeline>,
    ) -> Self {
        AgentRuntime {
            router,
            tools,
            pipeline,
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run to completion under a single deadline.
    pub async fn run(&self, request: RunRequest, timeout_ms: u64) -> Result<RunOutput, EngineError> {
        self.pipeline.record(
            DiagnosticEvent::runtime("run.started")
                .with_run_id(request.run_id.clone())
                .with_session_key(request.session_key.clone()),
        );

        let started = Instant::now();
        let result = tokio::select! {
            result = self.run_inner(&request) => result,
            _ = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
                warn!(run_id = %request.run_id, timeout_ms, "run deadline exceeded");
                Err(EngineError::Timeout(timeout_ms))
            }
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(mut output) => {
                output.latency_ms = latency_ms;
                self.pipeline.record(
                    DiagnosticEvent::runtime("run.completed")
                        .with_run_id(request.run_id.clone())
                        .with_session_key(request.session_key.clone())
                        .with_meta("latencyMs", latency_ms.to_string()),
                );
                Ok(output)
            }
            Err(e) => {
                let timed_out = e.is_timeout();
                if timed_out {
                    // The abandoned in-flight call is accounted for here:
                    // its failure event carries the timeout marker.
                    self.pipeline.record(
                        DiagnosticEvent::runtime("model.call.failed")
                            .with_run_id(request.run_id.clone())
                            .with_meta("timedOut", "true"),
                    );
                }
                self.pipeline.record(
                    DiagnosticEvent::runtime("run.failed")
                        .with_run_id(request.run_id.clone())
                        .with_session_key(request.session_key.clone())
                        .with_meta("timedOut", if timed_out { "true" } else { "false" }),
                );
                Err(e)
            }
        }
    }

    async fn run_inner(&self, request: &RunRequest) -> Result<RunOutput, EngineError> {
        // Tools run in declaration order; failures are collected, not fatal
        let mut tool_outcomes = Vec::with_capacity(request.tool_calls.len());
        for call in &request.tool_calls {
            debug!(run_id = %request.run_id, tool = %call.name, "executing tool call");
            let outcome = match self.tools.execute(&call.name, &call.args).await {
                Ok(output) => ToolOutcome {
                    name: call.name.clone(),
                    result: Ok(output),
                },
                Err(e) => ToolOutcome {
                    name: call.name.clone(),
                    result: Err(e.to_string()),
                },
            };
            tool_outcomes.push(outcome);
        }

        self.pipeline.record(
            DiagnosticEvent::runtime("model.call.started").with_run_id(request.run_id.clone()),
        );
        let model_started = Instant::now();

        let model_request = ModelRequest {
            prompt: request.prompt.clone(),
            provider_id: request.model_provider_id.clone(),
            policy: request.policy.clone(),
            metadata: Default::default(),
        };

        match self.router.generate(&model_request).await {
            Ok(response) => {
                self.pipeline.record(
                    DiagnosticEvent::runtime("model.call.completed")
                        .with_run_id(request.run_id.clone())
                        .with_meta("providerID", response.provider_id.clone())
                        .with_meta("modelID", response.model_id.clone())
                        .with_meta(
                            "latencyMs",
                            model_started.elapsed().as_millis().to_string(),
                        ),
                );
                Ok(RunOutput {
                    run_id: request.run_id.clone(),
                    session_key: request.session_key.clone(),
                    text: response.text,
                    provider_id: response.provider_id,
                    model_id: response.model_id,
                    tool_outcomes,
                    latency_ms: 0,
                })
            }
            Err(e) => {
                self.pipeline.record(
                    DiagnosticEvent::runtime("model.call.failed")
                        .with_run_id(request.run_id.clone())
                        .with_meta("timedOut", "false"),
                );
                Err(e)
            }
        }
    }

    /// Streamed run: each non-final model chunk is yielded, followed by
    /// exactly one final terminator event.
    pub fn run_stream(
        &self,
        request: RunRequest,
    ) -> Pin<Box<dyn Stream<Item = RunStreamEvent> + Send + 'static>> {
        let router = Arc::clone(&self.router);
        let pipeline = Arc::clone(&self.pipeline);

        Box::pin(async_stream::stream! {
            pipeline.record(
                DiagnosticEvent::runtime("run.started")
                    .with_run_id(request.run_id.clone())
                    .with_session_key(request.session_key.clone()),
            );
            let started = Instant::now();

            let model_request = ModelRequest {
                prompt: request.prompt.clone(),
                provider_id: request.model_provider_id.clone(),
                policy: request.policy.clone(),
                metadata: Default::default(),
            };

            pipeline.record(
                DiagnosticEvent::runtime("model.call.started").with_run_id(request.run_id.clone()),
            );

            match router.generate_stream(&model_request).await {
                Ok(mut chunks) => {
                    while let Some(chunk) = chunks.next().await {
                        if chunk.is_final {
                            break;
                        }
                        yield RunStreamEvent {
                            run_id: request.run_id.clone(),
                            session_key: request.session_key.clone(),
                            text: chunk.text,
                            is_final: false,
                        };
                    }
                    let latency_ms = started.elapsed().as_millis() as u64;
                    pipeline.record(
                        DiagnosticEvent::runtime("model.call.completed")
                            .with_run_id(request.run_id.clone())
                            .with_meta("latencyMs", latency_ms.to_string()),
                    );
                    pipeline.record(
                        DiagnosticEvent::runtime("run.completed")
                            .with_run_id(request.run_id.clone())
                            .with_session_key(request.session_key.clone())
                            .with_meta("latencyMs", latency_ms.to_string()),
                    );
                }
                Err(e) => {
                    pipeline.record(
                        DiagnosticEvent::runtime("model.call.failed")
                            .with_run_id(request.run_id.clone())
                            .with_meta("timedOut", "false"),
                    );
                    pipeline.record(
                        DiagnosticEvent::runtime("run.failed")
                            .with_run_id(request.run_id.clone())
                            .with_session_key(request.session_key.clone())
                            .with_meta("timedOut", "false"),
                    );
                    yield RunStreamEvent {
                        run_id: request.run_id.clone(),
                        session_key: request.session_key.clone(),
                        text: format!("Error: {e}"),
                        is_final: false,
                    };
                }
            }

            yield RunStreamEvent {
                run_id: request.run_id.clone(),
                session_key: request.session_key.clone(),
                text: String::new(),
                is_final: true,
            };
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;
    use async_trait::async_trait;
    use reefbot_providers::EchoProvider;

    struct SleepTool {
        millis: u64,
    }

    #[async_trait]
    impl Tool for SleepTool {
        fn name(&self) -> &str {
            "sleep"
        }

        fn description(&self) -> &str {
            "Sleep for a bit"
        }

        async fn execute(&self, _args: &serde_json::Value) -> Result<String, EngineError> {
            tokio::time::sleep(Duration::from_millis(self.millis)).await;
            Ok("slept".into())
        }
    }

    struct FailTool;

    #[async_trait]
    impl Tool for FailTool {
        fn name(&self) -> &str {
            "fail"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        async fn execute(&self, _args: &serde_json::Value) -> Result<String, EngineError> {
            Err(EngineError::Unavailable("tool broke".into()))
        }
    }

    fn make_runtime(tools: ToolRegistry) -> (AgentRuntime, Arc<DiagnosticsPipeline>) {
        let router = Arc::new(ModelRouter::new());
        router.register(Arc::new(EchoProvider::new()));
        let pipeline = Arc::new(DiagnosticsPipeline::default());
        (
            AgentRuntime::new(router, tools, Arc::clone(&pipeline)),
            pipeline,
        )
    }

    fn event_names(pipeline: &DiagnosticsPipeline) -> Vec<String> {
        pipeline
            .recent_events(100)
            .into_iter()
            .map(|e| e.name)
            .collect()
    }

    #[tokio::test]
    async fn test_run_success_event_order() {
        let (runtime, pipeline) = make_runtime(ToolRegistry::new());
        let request = RunRequest::new("webchat:u1", "hello prompt");

        let output = runtime.run(request, 5000).await.unwrap();
        assert_eq!(output.text, "hello prompt");
        assert_eq!(output.provider_id, "echo");

        assert_eq!(
            event_names(&pipeline),
            vec![
                "run.started",
                "model.call.started",
                "model.call.completed",
                "run.completed",
            ]
        );
    }

    #[tokio::test]
    async fn test_run_executes_tools_in_order() {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(SleepTool { millis: 1 }));
        tools.register(Arc::new(FailTool));
        let (runtime, _pipeline) = make_runtime(tools);

        let mut request = RunRequest::new("k", "prompt");
        request.tool_calls = vec![
            ToolCallRequest {
                name: "sleep".into(),
                args: serde_json::json!({}),
            },
            ToolCallRequest {
                name: "fail".into(),
                args: serde_json::json!({}),
            },
        ];

        let output = runtime.run(request, 5000).await.unwrap();
        assert_eq!(output.tool_outcomes.len(), 2);
        assert_eq!(output.tool_outcomes[0].name, "sleep");
        assert!(output.tool_outcomes[0].result.is_ok());
        assert_eq!(output.tool_outcomes[1].name, "fail");
        assert!(output.tool_outcomes[1].result.is_err());
    }

    #[tokio::test]
    async fn test_run_timeout_semantics() {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(SleepTool { millis: 300 }));
        let (runtime, pipeline) = make_runtime(tools);

        let mut request = RunRequest::new("k", "prompt");
        request.tool_calls = vec![ToolCallRequest {
            name: "sleep".into(),
            args: serde_json::json!({}),
        }];

        let err = runtime.run(request, 50).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("timed"));

        let usage = pipeline.usage_snapshot();
        assert_eq!(usage.runs_started, 1);
        assert_eq!(usage.runs_failed, 1);
        assert_eq!(usage.runs_timed_out, 1);
        assert_eq!(usage.model_failures, 1);

        // The failure event carries timedOut="true"
        let events = pipeline.recent_events(100);
        let failed = events
            .iter()
            .find(|e| e.name == "model.call.failed")
            .unwrap();
        assert_eq!(failed.metadata.get("timedOut").unwrap(), "true");
    }

    #[tokio::test]
    async fn test_run_model_failure_events() {
        let router = Arc::new(ModelRouter::new());
        let pipeline = Arc::new(DiagnosticsPipeline::default());
        let runtime = AgentRuntime::new(router, ToolRegistry::new(), Arc::clone(&pipeline));

        let err = runtime
            .run(RunRequest::new("k", "prompt"), 5000)
            .await
            .unwrap_err();
        assert!(err.is_unavailable());

        assert_eq!(
            event_names(&pipeline),
            vec![
                "run.started",
                "model.call.started",
                "model.call.failed",
                "run.failed",
            ]
        );
        let usage = pipeline.usage_snapshot();
        assert_eq!(usage.runs_timed_out, 0);
        assert_eq!(usage.model_failures, 1);
    }

    #[tokio::test]
    async fn test_run_stream_terminator_contract() {
        let (runtime, _pipeline) = make_runtime(ToolRegistry::new());
        let request = RunRequest::new("k", "stream me");

        let events: Vec<RunStreamEvent> = runtime.run_stream(request).collect().await;

        // Echo has no native streaming: one synthesized chunk + terminator
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].text, "stream me");
        assert!(!events[0].is_final);
        assert_eq!(events[1].text, "");
        assert!(events[1].is_final);

        // Exactly one final event
        assert_eq!(events.iter().filter(|e| e.is_final).count(), 1);
    }

    #[tokio::test]
    async fn test_run_stream_error_still_terminates() {
        let router = Arc::new(ModelRouter::new());
        let pipeline = Arc::new(DiagnosticsPipeline::default());
        let runtime = AgentRuntime::new(router, ToolRegistry::new(), pipeline);

        let events: Vec<RunStreamEvent> =
            runtime.run_stream(RunRequest::new("k", "p")).collect().await;
        assert!(events[0].text.starts_with("Error:"));
        assert!(events.last().unwrap().is_final);
    }

    #[tokio::test]
    async fn test_unique_run_ids() {
        let a = RunRequest::new("k", "p");
        let b = RunRequest::new("k", "p");
        assert_ne!(a.run_id, b.run_id);
    }
}
