//! Chat command — wires the full engine around the webchat adapter.
//!
//! Single-shot with `-m`, otherwise an interactive `rustyline` REPL.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use rustyline::DefaultEditor;

use reefbot_channels::{ChannelRegistry, WebchatAdapter};
use reefbot_core::bootstrap::BootstrapContextLoader;
use reefbot_core::config::load_config;
use reefbot_core::{
    utils, ConversationMemoryStore, DiagnosticsPipeline, InboundMessage, SessionStore,
    WorkspaceGuard,
};
use reefbot_providers::http::{OpenAiHttpConfig, OpenAiHttpProvider};
use reefbot_providers::{EchoProvider, ModelRouter};
use reefbot_runtime::{AgentRuntime, AutoReplyEngine, ToolRegistry};
use reefbot_skills::{SkillInvocationEngine, SkillRegistry};

/// Exit commands (case-insensitive match).
const EXIT_COMMANDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

/// Build the engine stack and run one message or the REPL.
pub async fn run(config_path: Option<&Path>, message: Option<String>) -> Result<()> {
    let config = load_config(config_path);
    config.validate().context("invalid configuration")?;

    let data_dir = utils::get_data_path();
    let workspace = utils::expand_home(&config.agents.workspace_root);

    let pipeline = Arc::new(DiagnosticsPipeline::default());

    // Providers: echo is always available; hosted providers join when
    // their section is enabled.
    let router = Arc::new(ModelRouter::new());
    router.register(Arc::new(EchoProvider::new()));
    if config.models.open_ai.enabled {
        router.register(Arc::new(OpenAiHttpProvider::new(OpenAiHttpConfig {
            provider_id: "openai".into(),
            api_key: config.models.open_ai.api_key.clone(),
            api_base: config
                .models
                .open_ai
                .api_base
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".into()),
            model: config.models.open_ai.model.clone(),
        })));
    }
    if config.models.open_ai_compatible.enabled {
        router.register(Arc::new(OpenAiHttpProvider::new(OpenAiHttpConfig {
            provider_id: "openai-compatible".into(),
            api_key: config.models.open_ai_compatible.api_key.clone(),
            api_base: config
                .models
                .open_ai_compatible
                .api_base
                .clone()
                .unwrap_or_else(|| "http://localhost:8080/v1".into()),
            model: config.models.open_ai_compatible.model.clone(),
        })));
    }
    if router
        .set_default_provider_id(&config.models.default_provider_id)
        .is_err()
    {
        eprintln!(
            "{} unknown default provider {:?}, falling back to echo",
            "warning:".yellow(),
            config.models.default_provider_id
        );
    }

    let runtime = Arc::new(AgentRuntime::new(
        router,
        ToolRegistry::new(),
        Arc::clone(&pipeline),
    ));

    let registry = Arc::new(ChannelRegistry::new(pipeline.sink()));
    let webchat = Arc::new(WebchatAdapter::new());
    registry
        .register(webchat.clone())
        .context("webchat registration failed")?;

    let sessions = Arc::new(SessionStore::open(data_dir.join("sessions.json"))?);
    let memory = Arc::new(ConversationMemoryStore::open(
        data_dir.join("conversation-memory.json"),
        None,
    )?);

    let guard = WorkspaceGuard::new(&workspace).context("workspace setup failed")?;
    let skills = SkillInvocationEngine::new(
        SkillRegistry::for_workspace(&workspace, Vec::new(), None, None),
        guard,
    );

    let engine = AutoReplyEngine::new(
        config.routing.clone(),
        config.agents.clone(),
        sessions,
        runtime,
        registry,
        pipeline,
    )
    .with_memory(memory)
    .with_skills(Arc::new(skills))
    .with_bootstrap(BootstrapContextLoader::new(&workspace));

    match message {
        Some(message) => {
            let reply = process_line(&engine, &message).await?;
            println!("{reply}");
            Ok(())
        }
        None => repl(&engine).await,
    }
}

async fn process_line(engine: &AutoReplyEngine, line: &str) -> Result<String> {
    let inbound = InboundMessage::new("webchat", "local", line);
    let outbound = engine
        .process(&inbound)
        .await
        .context("reply generation failed")?;
    Ok(outbound.text)
}

async fn repl(engine: &AutoReplyEngine) -> Result<()> {
    println!("{}", "Reefbot — type a message, or 'exit' to quit".bold());

    let mut editor = DefaultEditor::new()?;
    loop {
        let input = match editor.readline("You: ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted)
            | Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }
        if EXIT_COMMANDS.iter().any(|c| trimmed.eq_ignore_ascii_case(c)) {
            break;
        }

        let _ = editor.add_history_entry(&input);

        match process_line(engine, trimmed).await {
            Ok(reply) => println!("{} {reply}", "Bot:".green().bold()),
            Err(e) => eprintln!("{} {e}", "Error:".red().bold()),
        }
    }

    Ok(())
}
