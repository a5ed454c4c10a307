//! The query loop implementation.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use codeloop_core::context::{ContextProvider, ContextRequest, QueryContext};
use codeloop_core::error::{Error, Result};
use codeloop_core::message::{Message, Transcript};
use codeloop_core::model::{GenerateRequest, Generation, ModelAdapter, Usage};
use codeloop_core::plugin::{MessageEvent, PluginContext, QueryEndEvent, QueryStartEvent, UsageEvent};
use codeloop_core::tool::{ToolErrorPolicy, ToolInvocationRequest, ToolRegistry, ToolResult};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, trace, warn};
use uuid::Uuid;

use crate::hooks::HookBus;
use crate::invoker::{DEFAULT_TOOL_TIMEOUT, ToolInvoker};
use crate::parser::{self, format_tool_result};
use crate::prompt::PromptAssembler;
use crate::stream_event::{AgentStreamEvent, EchoFilter};

/// Default cap on model rounds per run.
pub const DEFAULT_MAX_ROUNDS: u32 = 25;

/// Input for one run.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// A new user prompt, appended after `messages`
    pub prompt: Option<String>,

    /// Prior messages to seed the run with
    pub messages: Option<Vec<Message>>,

    /// Behavioural instructions rendered at the top of the system prompt
    pub instructions: Vec<String>,

    /// Caller-supplied context blocks; these win over provider blocks
    pub context: QueryContext,

    /// Cancels the run at the next generation or tool boundary
    pub cancel: Option<CancellationToken>,
}

impl RunRequest {
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Self::default()
        }
    }

    pub fn messages(messages: Vec<Message>) -> Self {
        Self {
            messages: Some(messages),
            ..Self::default()
        }
    }

    pub fn with_instructions(mut self, instructions: Vec<String>) -> Self {
        self.instructions = instructions;
        self
    }

    pub fn with_context(mut self, context: QueryContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The final assistant message with any tool-use markup removed
    pub answer: String,

    /// The full transcript including the final answer
    pub transcript: Transcript,

    /// Number of model generations
    pub rounds: u32,

    /// Usage summed over all rounds that reported it
    pub usage: Usage,
}

struct RunSummary {
    answer: String,
    rounds: u32,
    usage: Usage,
}

/// Drives one conversation to a final answer.
///
/// Each run assembles a system prompt once (instructions, tools, context),
/// then alternates model generation and tool execution until the model
/// replies without a tool-use block.
pub struct QueryLoop {
    /// The model backend
    model: Arc<dyn ModelAdapter>,

    /// Model name passed through to the adapter
    model_name: String,

    /// Tools the model may call
    tools: Arc<ToolRegistry>,

    /// Plugins observing and shaping the run
    hooks: Arc<HookBus>,

    /// Source of context blocks collected at run start
    context_provider: Option<Arc<dyn ContextProvider>>,

    invoker: ToolInvoker,

    /// `None` means unbounded
    max_rounds: Option<u32>,

    /// Use streaming generation
    stream: bool,

    tool_error_policy: ToolErrorPolicy,

    /// Working directory handed to context providers and plugins
    cwd: PathBuf,

    /// Directory plugins may write to
    data_dir: Option<PathBuf>,

    /// Receiver side gets chunks, tool activity and completion
    events: Option<mpsc::UnboundedSender<AgentStreamEvent>>,
}

impl QueryLoop {
    /// Create a new query loop.
    pub fn new(
        model: Arc<dyn ModelAdapter>,
        model_name: impl Into<String>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            model,
            model_name: model_name.into(),
            tools,
            hooks: Arc::new(HookBus::new()),
            context_provider: None,
            invoker: ToolInvoker::new(DEFAULT_TOOL_TIMEOUT),
            max_rounds: Some(DEFAULT_MAX_ROUNDS),
            stream: false,
            tool_error_policy: ToolErrorPolicy::default(),
            cwd: std::env::current_dir().unwrap_or_default(),
            data_dir: None,
            events: None,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<HookBus>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.context_provider = Some(provider);
        self
    }

    /// Per-call tool timeout.
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.invoker = ToolInvoker::new(timeout);
        self
    }

    /// Cap on model rounds per run; `None` removes the cap.
    pub fn with_max_rounds(mut self, max: Option<u32>) -> Self {
        self.max_rounds = max;
        self
    }

    pub fn with_streaming(mut self, enabled: bool) -> Self {
        self.stream = enabled;
        self
    }

    pub fn with_tool_error_policy(mut self, policy: ToolErrorPolicy) -> Self {
        self.tool_error_policy = policy;
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_events(mut self, tx: mpsc::UnboundedSender<AgentStreamEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run against a fresh transcript and return it with the answer.
    pub async fn run(&self, request: RunRequest) -> Result<RunOutcome> {
        let mut transcript = Transcript::new();
        let summary = self.drive(&mut transcript, request).await?;
        Ok(RunOutcome {
            answer: summary.answer,
            transcript,
            rounds: summary.rounds,
            usage: summary.usage,
        })
    }

    /// Run against an existing transcript, appending to it.
    ///
    /// On failure the transcript keeps every message appended before the
    /// error, which lets interactive callers inspect or continue it.
    pub async fn run_in(&self, transcript: &mut Transcript, request: RunRequest) -> Result<String> {
        self.drive(transcript, request).await.map(|s| s.answer)
    }

    async fn drive(&self, transcript: &mut Transcript, request: RunRequest) -> Result<RunSummary> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("query", run_id = %run_id, model = %self.model_name);
        self.drive_inner(transcript, request, run_id, span.clone())
            .instrument(span)
            .await
    }

    async fn drive_inner(
        &self,
        transcript: &mut Transcript,
        request: RunRequest,
        run_id: String,
        span: tracing::Span,
    ) -> Result<RunSummary> {
        let RunRequest {
            prompt,
            messages,
            instructions,
            context,
            cancel,
        } = request;

        let messages = messages.unwrap_or_default();
        let prompt = prompt.filter(|p| !p.trim().is_empty());
        if messages.is_empty() && prompt.is_none() {
            return Err(Error::MissingInput);
        }

        let started_at = Utc::now();
        let started = Instant::now();
        let mut ctx = PluginContext::new(&run_id, self.cwd.clone(), &self.model_name).with_span(span);
        if let Some(dir) = &self.data_dir {
            ctx = ctx.with_data_dir(dir.clone());
        }

        info!(
            messages = transcript.len() + messages.len(),
            has_prompt = prompt.is_some(),
            tools = self.tools.len(),
            "Starting query"
        );

        self.hooks
            .query_start(
                &ctx,
                QueryStartEvent {
                    run_id: run_id.clone(),
                    prompt: prompt.clone(),
                    message_count: transcript.len() + messages.len() + usize::from(prompt.is_some()),
                    started_at,
                },
            )
            .await?;

        for message in messages {
            self.append(transcript, message, &ctx).await?;
        }
        if let Some(prompt) = &prompt {
            self.append(transcript, Message::user(prompt), &ctx).await?;
        }

        // ── Assemble the system prompt once ──
        let query_context = self.collect_context(prompt.clone(), context, &ctx).await?;
        let system = PromptAssembler::build(&instructions, &self.tools.definitions(), &query_context);
        let system = self.hooks.system_prompt(&ctx, system).await?;
        debug!(
            context_blocks = query_context.len(),
            system_chars = system.len(),
            "System prompt assembled"
        );

        let mut rounds = 0u32;
        let mut total_usage = Usage::default();

        loop {
            if let Some(max) = self.max_rounds
                && rounds >= max
            {
                warn!(rounds, "Round limit reached before a final answer");
                return Err(Error::MaxRoundsExceeded { rounds: max });
            }
            rounds += 1;
            debug!(round = rounds, messages = transcript.len(), "Generating");

            let request = GenerateRequest {
                model: self.model_name.clone(),
                system: system.clone(),
                transcript: transcript.messages.clone(),
                stream: self.stream,
            };
            let (text, usage) = self.generate(request, cancel.as_ref()).await?;

            if let Some(usage) = usage {
                total_usage.accumulate(&usage);
                self.hooks
                    .usage(
                        &ctx,
                        UsageEvent {
                            round: rounds,
                            model: self.model_name.clone(),
                            usage,
                        },
                    )
                    .await?;
            }

            let parsed = parser::parse(&text)?;
            let Some(invocation) = parsed.invocation else {
                let answer = parsed.cleaned_message;
                self.append(transcript, Message::assistant(&answer), &ctx).await?;

                self.hooks
                    .query_end(
                        &ctx,
                        QueryEndEvent {
                            run_id: run_id.clone(),
                            transcript: transcript.clone(),
                            answer: answer.clone(),
                            rounds,
                            usage: total_usage,
                            started_at,
                            ended_at: Utc::now(),
                        },
                    )
                    .await?;

                self.emit(AgentStreamEvent::Done {
                    run_id: run_id.clone(),
                    rounds,
                    usage: Some(total_usage),
                });
                info!(
                    rounds,
                    total_tokens = total_usage.total_tokens,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Query complete"
                );
                return Ok(RunSummary {
                    answer,
                    rounds,
                    usage: total_usage,
                });
            };

            // ── Tool dispatch ──
            if parsed.repaired {
                debug!(tool = %invocation.tool_name, "Dispatching with repaired arguments");
            }
            self.append(transcript, Message::assistant(&text), &ctx).await?;
            self.emit(AgentStreamEvent::ToolCall {
                name: invocation.tool_name.clone(),
                input: invocation.arguments_value(),
            });

            let (result, success) = self.dispatch(&invocation, &ctx, cancel.as_ref()).await?;
            let output = result.to_text();
            trace!(tool = %invocation.tool_name, output_len = output.len(), "Tool output");
            self.emit(AgentStreamEvent::ToolResult {
                name: invocation.tool_name.clone(),
                output,
                success,
            });

            self.append(
                transcript,
                Message::user(format_tool_result(&invocation.tool_name, &result)),
                &ctx,
            )
            .await?;
        }
    }

    /// Provider blocks, then caller blocks, then the `context` hook.
    async fn collect_context(
        &self,
        prompt: Option<String>,
        supplied: QueryContext,
        ctx: &PluginContext,
    ) -> Result<QueryContext> {
        let mut collected = match &self.context_provider {
            Some(provider) => {
                let request = ContextRequest {
                    cwd: self.cwd.clone(),
                    prompt,
                };
                provider.collect(&request).await?
            }
            None => QueryContext::new(),
        };
        collected.extend(supplied);
        Ok(self.hooks.context(ctx, collected).await?)
    }

    /// One generation: returns the full text and any usage report.
    async fn generate(
        &self,
        request: GenerateRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<(String, Option<Usage>)> {
        match cancellable(cancel, self.model.generate(request)).await?? {
            Generation::Complete(completion) => Ok((completion.text, completion.usage)),
            Generation::Stream(mut stream) => {
                let mut filter = EchoFilter::new();
                loop {
                    let next = match cancellable(cancel, stream.next_chunk()).await {
                        Ok(next) => next,
                        Err(e) => {
                            stream.close();
                            return Err(e);
                        }
                    };
                    match next {
                        None => break,
                        Some(Ok(chunk)) => {
                            if let Some(echo) = filter.push(&chunk) {
                                self.emit(AgentStreamEvent::Chunk { content: echo });
                            }
                        }
                        Some(Err(e)) => {
                            stream.close();
                            return Err(e.into());
                        }
                    }
                }
                if let Some(rest) = filter.finish() {
                    self.emit(AgentStreamEvent::Chunk { content: rest });
                }
                let usage = stream.usage();
                Ok((filter.into_text(), usage))
            }
        }
    }

    /// Invoke a tool, applying the error policy. The flag reports success.
    async fn dispatch(
        &self,
        invocation: &ToolInvocationRequest,
        ctx: &PluginContext,
        cancel: Option<&CancellationToken>,
    ) -> Result<(ToolResult, bool)> {
        let outcome = cancellable(
            cancel,
            self.invoker.invoke(&self.tools, invocation, &self.hooks, ctx),
        )
        .await?;

        match outcome {
            Ok(result) => Ok((result, true)),
            Err(Error::Tool(e))
                if e.is_execution_error() && self.tool_error_policy == ToolErrorPolicy::Report =>
            {
                warn!(tool = %invocation.tool_name, error = %e, "Reporting tool failure to the model");
                Ok((ToolResult::Text(format!("Error: {e}")), false))
            }
            Err(e) => Err(e),
        }
    }

    async fn append(&self, transcript: &mut Transcript, message: Message, ctx: &PluginContext) -> Result<()> {
        transcript.push(message.clone());
        self.hooks.message(ctx, MessageEvent { message }).await?;
        Ok(())
    }

    fn emit(&self, event: AgentStreamEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is listening.
            let _ = tx.send(event);
        }
    }
}

/// Race `fut` against the token, if any.
async fn cancellable<F: Future>(cancel: Option<&CancellationToken>, fut: F) -> Result<F::Output> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!("Query cancelled");
                Err(Error::Cancelled)
            }
            out = fut => Ok(out),
        },
        None => Ok(fut.await),
    }
}
