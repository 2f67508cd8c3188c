//! One-shot prompt runner.
//!
//! Run with: cargo run -p relay-cli -- --user me "list the files here"

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use futures::StreamExt;
use relay_core::{AgentRuntime, InterruptHandle, ResponseMode, ThinkingMode};
use relay_executor::{ClaudeCliRuntime, DEFAULT_CLAUDE_COMMAND, Executor, StreamItem};
use relay_observability::{ObservabilityConfig, ObservabilityHub};
use relay_session::{ConversationManager, FileSessionStore};
use relay_transport::StreamEvent;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Send a prompt to the coding agent, resuming the user's conversation.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Prompt to send. Optional when only changing settings.
    prompt: Option<String>,

    /// User identity
    #[arg(long, default_value = "local")]
    user: String,

    /// Platform tag partitioning sessions and logs
    #[arg(long, default_value = "cli")]
    platform: String,

    /// Set the working directory for this and later requests
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Directory holding session records (defaults to ~/.agent-relay)
    #[arg(long, env = "SESSIONS_DIR")]
    sessions_dir: Option<PathBuf>,

    /// Working directory for users who never set one
    #[arg(long, env = "WORKING_DIRECTORY")]
    default_dir: Option<PathBuf>,

    /// Agent CLI command line
    #[arg(long, env = "CLAUDE_COMMAND", default_value = DEFAULT_CLAUDE_COMMAND)]
    claude_command: String,

    /// Print wire events as JSON lines while the agent works
    #[arg(long)]
    stream: bool,

    /// Include thinking in this response
    #[arg(long)]
    thinking: bool,

    /// Start a fresh conversation
    #[arg(long)]
    reset: bool,

    /// Persist whether thinking is shown
    #[arg(long, value_enum)]
    show_thinking: Option<Toggle>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let sessions_dir = match cli.sessions_dir.clone() {
        Some(dir) => dir,
        None => dirs::home_dir()
            .context("Cannot determine home directory; pass --sessions-dir")?
            .join(".agent-relay"),
    };
    let mut store = FileSessionStore::new(sessions_dir);
    if let Some(dir) = &cli.default_dir {
        store = store.with_default_dir(dir);
    }

    let hub = Arc::new(ObservabilityHub::from_config(&ObservabilityConfig::from_env()));
    tracing::debug!(backends = ?hub.backend_names(), "Observability ready");
    let runtime: Arc<dyn AgentRuntime> = Arc::new(ClaudeCliRuntime::new(cli.claude_command.clone()));
    let manager = Arc::new(ConversationManager::new(store, Executor::new(runtime, hub)));

    let (user, platform) = (cli.user.as_str(), cli.platform.as_str());

    if cli.reset {
        manager.reset(user, platform).await?;
        println!("Conversation reset.");
    }
    if let Some(toggle) = cli.show_thinking {
        let show = matches!(toggle, Toggle::On);
        manager.set_show_thinking(user, platform, show).await?;
        println!("Thinking display {}.", if show { "enabled" } else { "disabled" });
    }
    if let Some(dir) = &cli.cwd {
        let dir = manager.set_working_directory(user, platform, dir).await?;
        println!("Working directory set to {}", dir.display());
    }

    let Some(prompt) = cli.prompt.clone() else {
        if cli.reset || cli.show_thinking.is_some() || cli.cwd.is_some() {
            return Ok(());
        }
        bail!("No prompt given");
    };

    let show_thinking = cli.thinking.then_some(true);
    if cli.stream {
        stream(&manager, user, platform, &prompt, show_thinking).await
    } else {
        buffered(&manager, user, platform, &prompt, show_thinking).await
    }
}

async fn buffered(
    manager: &Arc<ConversationManager<FileSessionStore>>,
    user: &str,
    platform: &str,
    prompt: &str,
    show_thinking: Option<bool>,
) -> Result<()> {
    let mut task = {
        let manager = Arc::clone(manager);
        let (user, platform, prompt) = (user.to_string(), platform.to_string(), prompt.to_string());
        tokio::spawn(async move {
            manager
                .send_with_thinking(&user, &platform, &prompt, show_thinking)
                .await
        })
    };

    let reply = tokio::select! {
        joined = &mut task => joined,
        _ = tokio::signal::ctrl_c() => {
            if manager.interrupt(user, platform).await {
                eprintln!("Interrupting...");
            }
            task.await
        }
    }
    .context("Request task failed")??;

    println!("{}", reply.text);
    tracing::info!(
        session_id = reply.session_id.as_deref().unwrap_or("-"),
        duration_ms = reply.metrics.duration_ms,
        tools = ?reply.tools,
        "Request complete"
    );
    Ok(())
}

async fn stream(
    manager: &ConversationManager<FileSessionStore>,
    user: &str,
    platform: &str,
    prompt: &str,
    show_thinking: Option<bool>,
) -> Result<()> {
    let config = manager
        .request_config(user, platform, ResponseMode::Stream, show_thinking)
        .await?;
    let include_thinking = config.thinking_mode() == ThinkingMode::Include;
    let interrupt = InterruptHandle::new();
    let mut execution = manager.executor().execute_stream_with_interrupt(
        prompt,
        config.clone(),
        interrupt.clone(),
    );

    loop {
        let item = tokio::select! {
            item = execution.next() => item,
            _ = tokio::signal::ctrl_c(), if !interrupt.is_interrupted() => {
                interrupt.interrupt();
                continue;
            }
        };
        let Some(item) = item else {
            bail!("Stream ended unexpectedly");
        };
        match item {
            Ok(item) => {
                for event in StreamEvent::from_item(&item, include_thinking) {
                    println!("{}", event.to_json());
                }
                if let StreamItem::Final(response) = item {
                    manager.remember(&config, &response).await;
                    return Ok(());
                }
            }
            Err(e) => {
                println!(
                    "{}",
                    StreamEvent::Error {
                        message: e.to_string()
                    }
                    .to_json()
                );
                return Err(e.into());
            }
        }
    }
}
