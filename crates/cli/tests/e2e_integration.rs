//! End-to-end integration tests for the codeloop pipeline.
//!
//! These wire config defaults, the built-in tools, bundled plugins and
//! context providers into a QueryLoop driven by a scripted model, and check
//! what reaches the disk, the transcript and the event stream.

use std::sync::{Arc, Mutex};

use codeloop_agent::{
    AgentStreamEvent, CompositeContextProvider, DirectoryProvider, HookBus, ProjectFilesProvider,
    QueryLoop, RunRequest, SessionRecorder, UsageTracker, default_instructions, format_tool_use,
};
use codeloop_config::{AppConfig, ToolsConfig};
use codeloop_core::error::{Error, ModelError, ToolError};
use codeloop_core::model::{Completion, GenerateRequest, ModelAdapter, Usage};
use codeloop_core::{Role, ToolErrorPolicy};
use serde_json::{Value, json};

// ── Scripted model ───────────────────────────────────────────────────────

/// Returns scripted replies in order and records every request.
struct ScriptedModel {
    replies: Vec<String>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedModel {
    fn new(replies: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            replies,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, i: usize) -> GenerateRequest {
        self.requests.lock().unwrap()[i].clone()
    }
}

#[async_trait::async_trait]
impl ModelAdapter for ScriptedModel {
    fn name(&self) -> &str {
        "e2e-scripted"
    }

    async fn complete(&self, request: GenerateRequest) -> Result<Completion, ModelError> {
        let mut requests = self.requests.lock().unwrap();
        let index = requests.len();
        requests.push(request);
        let text = self.replies.get(index).cloned().unwrap_or_else(|| {
            panic!("ScriptedModel exhausted: call #{index}, have {}", self.replies.len())
        });
        Ok(Completion {
            text,
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
        })
    }
}

fn tool_use(name: &str, args: Value) -> String {
    let Value::Object(map) = args else {
        panic!("tool arguments must be an object");
    };
    format_tool_use(name, &map)
}

fn registry(root: &std::path::Path, config: &ToolsConfig) -> Arc<codeloop_core::ToolRegistry> {
    Arc::new(codeloop_tools::default_registry(config, root).unwrap())
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn write_then_read_round_trip_with_plugins() {
    let project = tempfile::tempdir().unwrap();
    let sessions = tempfile::tempdir().unwrap();
    let config = AppConfig::default();

    let model = ScriptedModel::new(vec![
        format!(
            "I'll create the file.\n{}",
            tool_use("write", json!({"path": "src/hello.txt", "content": "hello world\n"}))
        ),
        tool_use("read", json!({"path": "src/hello.txt"})),
        "Done: src/hello.txt contains `hello world`.".into(),
    ]);

    let usage = Arc::new(UsageTracker::new());
    let recorder = Arc::new(SessionRecorder::new(sessions.path()));
    let hooks = HookBus::new()
        .with_plugin(usage.clone())
        .with_plugin(recorder.clone());

    let query_loop = QueryLoop::new(model.clone(), config.model.clone(), registry(project.path(), &config.tools))
        .with_hooks(Arc::new(hooks))
        .with_max_rounds(config.agent.max_rounds())
        .with_cwd(project.path());

    let outcome = query_loop
        .run(RunRequest::prompt("create src/hello.txt").with_instructions(default_instructions()))
        .await
        .unwrap();

    assert_eq!(outcome.answer, "Done: src/hello.txt contains `hello world`.");
    assert_eq!(outcome.rounds, 3);
    assert_eq!(outcome.usage.total_tokens, 45);
    assert_eq!(
        std::fs::read_to_string(project.path().join("src/hello.txt")).unwrap(),
        "hello world\n"
    );

    // user, (assistant, tool result) × 2, final assistant
    let messages = &outcome.transcript.messages;
    assert_eq!(messages.len(), 6);
    assert_eq!(messages[2].role, Role::User);
    assert_eq!(
        messages[2].content,
        "<tool_result name=\"write\">\nCreated src/hello.txt (12 bytes)\n</tool_result>"
    );
    assert!(messages[4].content.contains("     1\thello world"));

    let totals = usage.totals();
    assert_eq!(totals.queries, 1);
    assert_eq!(totals.rounds, 3);
    assert_eq!(totals.usage.total_tokens, 45);

    // Session log: one file, bracketed by query_start and query_end.
    let path = recorder.path().await.unwrap();
    let log = std::fs::read_to_string(path).unwrap();
    let kinds: Vec<String> = log
        .lines()
        .map(|l| serde_json::from_str::<Value>(l).unwrap()["type"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(kinds.first().map(String::as_str), Some("query_start"));
    assert_eq!(kinds.last().map(String::as_str), Some("query_end"));
    assert_eq!(kinds.iter().filter(|k| *k == "tool_end").count(), 2);
    assert_eq!(kinds.iter().filter(|k| *k == "usage").count(), 3);
}

#[tokio::test]
async fn system_prompt_lists_tools_and_context() {
    let project = tempfile::tempdir().unwrap();
    std::fs::write(project.path().join("README.md"), "# Demo project\n").unwrap();
    std::fs::write(project.path().join("notes.txt"), "").unwrap();

    let model = ScriptedModel::new(vec![
        tool_use("ls", json!({})),
        "Two files.".into(),
    ]);
    let providers = CompositeContextProvider::new()
        .with_provider(Arc::new(DirectoryProvider::new(50)))
        .with_provider(Arc::new(ProjectFilesProvider::new(4096)));

    let query_loop = QueryLoop::new(model.clone(), "gpt-4o", registry(project.path(), &ToolsConfig::default()))
        .with_context_provider(Arc::new(providers))
        .with_cwd(project.path());

    let outcome = query_loop.run(RunRequest::prompt("what is here?")).await.unwrap();
    assert_eq!(outcome.answer, "Two files.");
    assert_eq!(
        outcome.transcript.messages[2].content,
        "<tool_result name=\"ls\">\nREADME.md\nnotes.txt\n</tool_result>"
    );

    let first = model.request(0);
    for tool in ["read", "write", "edit", "bash", "grep", "glob", "ls"] {
        assert!(first.system.contains(&format!("<name>{tool}</name>")), "missing {tool}");
    }
    assert!(first.system.contains("<context name=\"directoryStructure\">"));
    assert!(first.system.contains("<context name=\"readme\">\n# Demo project\n</context>"));

    // The prompt is frozen for the whole run.
    assert_eq!(model.request(1).system, first.system);
}

#[tokio::test]
async fn blocked_command_propagates_by_default() {
    let project = tempfile::tempdir().unwrap();
    let tools = ToolsConfig {
        allowed_commands: vec!["ls".into()],
        ..ToolsConfig::default()
    };
    let model = ScriptedModel::new(vec![tool_use("bash", json!({"command": "rm -rf src"}))]);

    let query_loop = QueryLoop::new(model.clone(), "gpt-4o", registry(project.path(), &tools));
    let err = query_loop.run(RunRequest::prompt("clean up")).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Tool(ToolError::PermissionDenied { ref tool_name, .. }) if tool_name == "bash"
    ));
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn report_policy_lets_the_model_recover() {
    let project = tempfile::tempdir().unwrap();
    std::fs::write(project.path().join("lib.rs"), "fn a() {}\n").unwrap();

    let model = ScriptedModel::new(vec![
        tool_use(
            "edit",
            json!({"path": "lib.rs", "old_string": "fn b()", "new_string": "fn c()"}),
        ),
        tool_use(
            "edit",
            json!({"path": "lib.rs", "old_string": "fn a()", "new_string": "fn c()"}),
        ),
        "Renamed a to c.".into(),
    ]);

    let query_loop = QueryLoop::new(model.clone(), "gpt-4o", registry(project.path(), &ToolsConfig::default()))
        .with_tool_error_policy(ToolErrorPolicy::Report);
    let outcome = query_loop.run(RunRequest::prompt("rename a to c")).await.unwrap();

    assert_eq!(outcome.answer, "Renamed a to c.");
    let failed = &outcome.transcript.messages[2].content;
    assert!(failed.starts_with("<tool_result name=\"edit\">\nError: "));
    assert!(failed.contains("old_string not found"));
    assert_eq!(
        std::fs::read_to_string(project.path().join("lib.rs")).unwrap(),
        "fn c() {}\n"
    );
}

#[tokio::test]
async fn streamed_events_hide_tool_markup() {
    let project = tempfile::tempdir().unwrap();
    std::fs::write(project.path().join("a.txt"), "").unwrap();

    let model = ScriptedModel::new(vec![
        format!("Let me look.\n{}", tool_use("ls", json!({}))),
        "Just a.txt.".into(),
    ]);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let query_loop = QueryLoop::new(model.clone(), "gpt-4o", registry(project.path(), &ToolsConfig::default()))
        .with_streaming(true)
        .with_events(tx);

    let outcome = query_loop.run(RunRequest::prompt("list")).await.unwrap();
    assert_eq!(outcome.answer, "Just a.txt.");
    drop(query_loop);

    let mut echoed = String::new();
    let mut kinds = Vec::new();
    while let Some(event) = rx.recv().await {
        kinds.push(event.event_type());
        if let AgentStreamEvent::Chunk { content } = &event {
            echoed.push_str(content);
        }
    }
    assert!(!echoed.contains("<use_tool"));
    assert!(echoed.contains("Let me look."));
    assert!(echoed.ends_with("Just a.txt."));
    assert!(kinds.contains(&"tool_call"));
    assert!(kinds.contains(&"tool_result"));
    assert_eq!(kinds.last(), Some(&"done"));
}

#[tokio::test]
async fn missing_arguments_default_to_empty_object() {
    let project = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(vec![
        "<use_tool>\n  <tool_name>ls</tool_name>\n</use_tool>".into(),
        "Empty.".into(),
    ]);
    let query_loop = QueryLoop::new(model.clone(), "gpt-4o", registry(project.path(), &ToolsConfig::default()));

    let outcome = query_loop.run(RunRequest::prompt("anything here?")).await.unwrap();
    assert_eq!(outcome.answer, "Empty.");
    assert_eq!(
        outcome.transcript.messages[2].content,
        "<tool_result name=\"ls\">\n(empty directory)\n</tool_result>"
    );
}
