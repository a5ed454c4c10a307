//! ModelAdapter trait: the abstraction over LLM backends.
//!
//! A model adapter knows how to send a transcript plus system prompt to an
//! LLM and get text back, either as one complete completion or as a lazy
//! stream of text chunks.
//!
//! The core is agnostic to the provider behind it; concrete adapters live in
//! `codeloop-providers` (or in the embedding application).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ModelError;
use crate::message::Message;

/// One round of generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// The model to use (e.g., "gpt-4o")
    pub model: String,

    /// The frozen system prompt of the run
    pub system: String,

    /// The full transcript so far
    pub transcript: Vec<Message>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Add another usage report into this one.
    pub fn accumulate(&mut self, other: &Usage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

/// A complete (non-streaming) generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// The generated text
    pub text: String,

    /// Token usage statistics
    pub usage: Option<Usage>,
}

/// A single chunk on the wire between an adapter and a [`ChannelTextStream`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// A lazy, finite, single-consumption sequence of text chunks.
///
/// The consumer suspends at each `next_chunk`. Usage is only known once the
/// stream is exhausted.
#[async_trait]
pub trait TextStream: Send {
    /// The next text chunk, or `None` once the stream is exhausted.
    async fn next_chunk(&mut self) -> Option<Result<String, ModelError>>;

    /// Usage reported by the provider, available after exhaustion.
    fn usage(&self) -> Option<Usage>;

    /// Stop consuming. Further `next_chunk` calls return `None`.
    fn close(&mut self);
}

/// The result of [`ModelAdapter::generate`].
pub enum Generation {
    Complete(Completion),
    Stream(Box<dyn TextStream>),
}

impl std::fmt::Debug for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete(c) => f.debug_tuple("Complete").field(c).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// A [`TextStream`] fed by an mpsc channel, usually from a task reading an
/// SSE byte stream.
pub struct ChannelTextStream {
    rx: mpsc::Receiver<Result<StreamChunk, ModelError>>,
    usage: Option<Usage>,
    finished: bool,
}

impl ChannelTextStream {
    pub fn new(rx: mpsc::Receiver<Result<StreamChunk, ModelError>>) -> Self {
        Self {
            rx,
            usage: None,
            finished: false,
        }
    }
}

#[async_trait]
impl TextStream for ChannelTextStream {
    async fn next_chunk(&mut self) -> Option<Result<String, ModelError>> {
        while !self.finished {
            match self.rx.recv().await {
                None => self.finished = true,
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                Some(Ok(chunk)) => {
                    if chunk.usage.is_some() {
                        self.usage = chunk.usage;
                    }
                    if chunk.done {
                        self.finished = true;
                    }
                    if let Some(content) = chunk.content
                        && !content.is_empty()
                    {
                        return Some(Ok(content));
                    }
                }
            }
        }
        None
    }

    fn usage(&self) -> Option<Usage> {
        self.usage
    }

    fn close(&mut self) {
        self.rx.close();
        self.finished = true;
    }
}

/// The core ModelAdapter trait.
///
/// The query loop calls `generate()` without knowing which provider is
/// being used.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// A human-readable name for this adapter (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: GenerateRequest) -> Result<Completion, ModelError>;

    /// Send a request and get a stream of text chunks.
    ///
    /// Default implementation calls `complete()` and wraps the result as a
    /// single chunk.
    async fn stream(&self, request: GenerateRequest) -> Result<Box<dyn TextStream>, ModelError> {
        let completion = self.complete(request).await?;
        let (tx, rx) = mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                content: Some(completion.text),
                done: true,
                usage: completion.usage,
            }))
            .await;
        Ok(Box::new(ChannelTextStream::new(rx)))
    }

    /// One round of generation, streaming or batch per `request.stream`.
    async fn generate(&self, request: GenerateRequest) -> Result<Generation, ModelError> {
        if request.stream {
            Ok(Generation::Stream(self.stream(request).await?))
        } else {
            Ok(Generation::Complete(self.complete(request).await?))
        }
    }
}
