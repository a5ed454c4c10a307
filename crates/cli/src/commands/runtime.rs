//! Wiring shared by `ask` and `chat`: config → tools → model → plugins →
//! context providers → query loop.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use codeloop_agent::{
    AgentStreamEvent, CancellationToken, CompositeContextProvider, DirectoryProvider,
    FileMentionProvider, GitStatusProvider, HookBus, ProjectFilesProvider, QueryLoop,
    SessionRecorder, UsageTracker, default_instructions,
};
use codeloop_config::{AppConfig, ContextConfig};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Everything a command needs to drive runs.
pub struct Runtime {
    pub query_loop: QueryLoop,
    pub instructions: Vec<String>,
    pub recorder: Option<Arc<SessionRecorder>>,
    pub usage: Arc<UsageTracker>,
    pub streaming: bool,
    printer: JoinHandle<()>,
}

impl Runtime {
    pub fn build(dir: PathBuf) -> anyhow::Result<Self> {
        let config = AppConfig::load().context("Failed to load config")?;

        let tools = codeloop_tools::default_registry(&config.tools, dir.clone())
            .context("Failed to register tools")?;
        let model = codeloop_providers::build_from_config(&config).context("No usable model")?;

        let usage = Arc::new(UsageTracker::new());
        let mut hooks = HookBus::new().with_plugin(usage.clone());
        let recorder = config
            .session
            .enabled
            .then(|| Arc::new(SessionRecorder::new(config.session.resolved_dir())));
        if let Some(recorder) = &recorder {
            hooks.register(recorder.clone());
        }
        debug!(plugins = ?hooks.names(), "Plugins registered");

        let (tx, rx) = mpsc::unbounded_channel();
        let printer = spawn_printer(rx);

        let mut query_loop = QueryLoop::new(Arc::new(model), config.model.clone(), Arc::new(tools))
            .with_hooks(Arc::new(hooks))
            .with_tool_timeout(Duration::from_millis(config.agent.tool_timeout_ms))
            .with_max_rounds(config.agent.max_rounds())
            .with_streaming(config.agent.stream)
            .with_tool_error_policy(config.agent.tool_errors)
            .with_cwd(dir)
            .with_data_dir(AppConfig::config_dir())
            .with_events(tx);
        let providers = context_providers(&config.context);
        if !providers.is_empty() {
            query_loop = query_loop.with_context_provider(Arc::new(providers));
        }

        let mut instructions = default_instructions();
        instructions.extend(config.agent.instructions.iter().cloned());

        Ok(Self {
            query_loop,
            instructions,
            recorder,
            usage,
            streaming: config.agent.stream,
            printer,
        })
    }

    /// Flush the session log and wait for pending output.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        if let Some(recorder) = &self.recorder {
            recorder.close().await.context("Failed to close session log")?;
        }
        let Self { query_loop, printer, .. } = self;
        // Dropping the loop drops the event sender, which ends the printer.
        drop(query_loop);
        let _ = printer.await;
        Ok(())
    }
}

pub fn context_providers(config: &ContextConfig) -> CompositeContextProvider {
    let mut providers = CompositeContextProvider::new();
    if config.git {
        providers.push(Arc::new(GitStatusProvider::new()));
    }
    if config.directory {
        providers.push(Arc::new(DirectoryProvider::new(config.max_directory_entries)));
    }
    if config.project_files {
        providers.push(Arc::new(ProjectFilesProvider::new(config.max_file_bytes)));
    }
    if config.file_mentions {
        providers.push(Arc::new(FileMentionProvider::new(config.max_file_bytes)));
    }
    providers
}

/// A token cancelled by Ctrl+C, plus the watcher to abort once the run ends.
pub fn ctrl_c_token() -> (CancellationToken, JoinHandle<()>) {
    let token = CancellationToken::new();
    let watched = token.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n  Cancelling...");
            watched.cancel();
        }
    });
    (token, watcher)
}

/// Streamed text goes to stdout; tool activity goes to stderr.
fn spawn_printer(mut rx: mpsc::UnboundedReceiver<AgentStreamEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut mid_line = false;
        while let Some(event) = rx.recv().await {
            match event {
                AgentStreamEvent::Chunk { content } => {
                    print!("{content}");
                    let _ = std::io::stdout().flush();
                    mid_line = !content.ends_with('\n');
                }
                AgentStreamEvent::ToolCall { name, input } => {
                    if mid_line {
                        println!();
                        mid_line = false;
                    }
                    eprintln!("  [tool] {name} {input}");
                }
                AgentStreamEvent::ToolResult { name, output, success } => {
                    let status = if success { "ok" } else { "error" };
                    eprintln!("  [{status}] {name} ({} lines)", output.lines().count());
                }
                AgentStreamEvent::Done { .. } => {
                    if mid_line {
                        println!();
                        mid_line = false;
                    }
                }
            }
        }
    })
}
