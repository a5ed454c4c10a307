//! The query loop: the heart of codeloop.
//!
//! A run follows an **Assemble → Generate → Dispatch** cycle:
//!
//! 1. **Assemble** the system prompt once: instructions, tool catalogue and
//!    context blocks, each shaped by plugin hooks
//! 2. **Generate** a reply from the model (batch or streamed)
//! 3. **If the reply holds a `<use_tool>` block**: run the tool, append the
//!    framed result as a user message, loop back to step 2
//! 4. **Otherwise**: the reply is the final answer
//!
//! The loop stops at the final answer, on any error, on cancellation, or
//! when the round cap is hit.

pub mod context;
pub mod hooks;
pub mod invoker;
pub mod loop_runner;
pub mod parser;
pub mod plugins;
pub mod prompt;
pub mod repair;
pub mod stream_event;

pub use context::{
    CompositeContextProvider, DirectoryProvider, FileMentionProvider, GitStatusProvider,
    ProjectFilesProvider,
};
pub use hooks::HookBus;
pub use invoker::{DEFAULT_TOOL_TIMEOUT, ToolInvoker};
pub use loop_runner::{DEFAULT_MAX_ROUNDS, QueryLoop, RunOutcome, RunRequest};
pub use parser::{ParsedOutput, format_tool_result, format_tool_use, parse};
pub use plugins::{SessionRecorder, UsageTotals, UsageTracker};
pub use prompt::{DEFAULT_INSTRUCTIONS, PromptAssembler, default_instructions};
pub use stream_event::{AgentStreamEvent, EchoFilter};
pub use tokio_util::sync::CancellationToken;
