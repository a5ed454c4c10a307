//! # codeloop core
//!
//! Domain types, traits, and error definitions for the codeloop coding agent.
//! This crate has **no framework dependencies**. It defines the domain model
//! that the engine and every collaborator implement against.
//!
//! ## Design Philosophy
//!
//! Every seam is a trait here: model adapters, tools, plugins, context
//! providers. Implementations live in their respective crates or in the
//! embedding application. This enables:
//! - Swapping model backends via configuration
//! - Easy testing with scripted stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod context;
pub mod error;
pub mod message;
pub mod model;
pub mod plugin;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use context::{ContextProvider, ContextRequest, QueryContext};
pub use error::{ContextError, Error, ModelError, PluginError, ProtocolError, Result, ToolError};
pub use message::{Message, Role, Transcript, TranscriptId};
pub use model::{
    ChannelTextStream, Completion, GenerateRequest, Generation, ModelAdapter, StreamChunk,
    TextStream, Usage,
};
pub use plugin::{
    Enforce, Hook, HookEvent, HookMode, MessageEvent, Plugin, PluginContext, QueryEndEvent,
    QueryStartEvent, ToolEndEvent, ToolOutcome, ToolStartEvent, UsageEvent,
};
pub use tool::{
    Tool, ToolDefinition, ToolErrorPolicy, ToolInvocationRequest, ToolRegistry, ToolResult,
};
