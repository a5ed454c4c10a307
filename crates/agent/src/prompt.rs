//! System prompt assembly.
//!
//! The prompt is built once per run from three inputs (instructions, tool
//! definitions, context blocks) and frozen before the first generation.
//! Rendering is a pure function of those inputs; the same inputs always
//! produce the same bytes.

use codeloop_core::context::QueryContext;
use codeloop_core::tool::ToolDefinition;

use crate::parser::{
    ARGUMENTS_CLOSE, ARGUMENTS_OPEN, TOOL_NAME_CLOSE, TOOL_NAME_OPEN, USE_TOOL_CLOSE, USE_TOOL_OPEN,
};

/// Behavioural instructions used when the caller supplies none.
pub const DEFAULT_INSTRUCTIONS: &str = "\
You are codeloop, a coding assistant working inside the user's project directory.
Work step by step: inspect files before changing them, make the smallest change that solves the task, and verify your work when you can.
Paths are relative to the project root. Keep answers short and concrete, and say plainly when you cannot do something.";

/// Builds the system prompt for a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptAssembler;

impl PromptAssembler {
    /// Assemble the system prompt.
    ///
    /// Sections appear in a fixed order: instructions, tool catalogue (only
    /// when `tools` is non-empty), then context blocks (only when `context`
    /// is non-empty, sorted by name).
    pub fn build(instructions: &[String], tools: &[ToolDefinition], context: &QueryContext) -> String {
        let mut sections: Vec<String> = Vec::new();

        let instructions: Vec<&str> = instructions
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if !instructions.is_empty() {
            sections.push(instructions.join("\n\n"));
        }

        if !tools.is_empty() {
            sections.push(Self::tools_section(tools));
        }

        if !context.is_empty() {
            sections.push(Self::context_section(context));
        }

        sections.join("\n\n")
    }

    fn tools_section(tools: &[ToolDefinition]) -> String {
        let mut out = String::from("# Tool Use\n\n");
        out.push_str(
            "You can call tools to inspect and change the project. Call at most one tool per \
             message, then stop and wait: the result arrives in the next user message inside \
             <tool_result> tags. To call a tool, write exactly:\n\n",
        );
        out.push_str(&format!(
            "{USE_TOOL_OPEN}\n  {TOOL_NAME_OPEN}read{TOOL_NAME_CLOSE}\n  {ARGUMENTS_OPEN}\n    {{\"path\": \"src/main.rs\"}}\n  {ARGUMENTS_CLOSE}\n{USE_TOOL_CLOSE}\n\n"
        ));
        out.push_str(
            "The arguments must be a single JSON object matching the tool's input schema. \
             When the task is complete, reply without a tool call; that reply is your final answer.\n\n",
        );
        out.push_str("## Available Tools");

        for tool in tools {
            out.push_str(&format!(
                "\n\n<tool>\n  <name>{}</name>\n  <description>{}</description>\n  <input_json_schema>{}</input_json_schema>\n</tool>",
                tool.name, tool.description, tool.parameters
            ));
        }
        out
    }

    fn context_section(context: &QueryContext) -> String {
        let mut out = String::from("# Context\n\nAs you answer, you can use the following context:");
        for (name, content) in context.iter() {
            out.push_str(&format!(
                "\n<context name=\"{name}\">\n{}\n</context>",
                content.trim_end()
            ));
        }
        out
    }
}

/// The default instruction list as owned strings.
pub fn default_instructions() -> Vec<String> {
    vec![DEFAULT_INSTRUCTIONS.to_string()]
}
