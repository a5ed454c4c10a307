//! OpenAI-compatible model adapter.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI, and any
//! endpoint exposing `/chat/completions`.
//!
//! Supports:
//! - Batch completions
//! - Streaming completions over SSE, with usage in the final chunk
//!
//! The query loop speaks a text-embedded tool protocol, so no native
//! function-calling fields are sent.

use std::time::Duration;

use async_trait::async_trait;
use codeloop_core::error::ModelError;
use codeloop_core::message::Message;
use codeloop_core::model::{
    ChannelTextStream, Completion, GenerateRequest, ModelAdapter, StreamChunk, TextStream, Usage,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// A [`ModelAdapter`] for OpenAI-compatible chat-completion endpoints.
pub struct OpenAiCompatModel {
    name: String,
    base_url: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl OpenAiCompatModel {
    /// Create a new adapter. `api_key` may be `None` for local endpoints.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, ModelError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ModelError::NotConfigured("base_url is empty".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ModelError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url,
            api_key: api_key.filter(|k| !k.is_empty()),
            temperature: 0.2,
            max_tokens: None,
            client,
        })
    }

    /// OpenAI itself (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Result<Self, ModelError> {
        Self::new("openai", "https://api.openai.com/v1", Some(api_key.into()))
    }

    /// A local Ollama server (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Result<Self, ModelError> {
        Self::new("ollama", base_url.unwrap_or("http://localhost:11434/v1"), None)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The system prompt travels as the first message.
    fn to_api_messages(system: &str, transcript: &[Message]) -> Vec<ApiMessage> {
        let system = (!system.is_empty()).then(|| ApiMessage {
            role: "system".into(),
            content: system.to_string(),
        });
        system
            .into_iter()
            .chain(transcript.iter().map(|m| ApiMessage {
                role: m.role.as_str().into(),
                content: m.content.clone(),
            }))
            .collect()
    }

    fn request_body(&self, request: &GenerateRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.system, &request.transcript),
            "temperature": self.temperature,
            "stream": stream,
        });
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }
        body
    }

    async fn send(
        &self,
        request: &GenerateRequest,
        stream: bool,
    ) -> Result<reqwest::Response, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&self.request_body(request, stream));
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        if stream {
            builder = builder.header("Accept", "text/event-stream");
        }

        debug!(adapter = %self.name, model = %request.model, stream, "Sending completion request");

        let response = builder
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;
        check_status(response).await
    }
}

/// Map non-success HTTP statuses onto [`ModelError`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ModelError> {
    let status = response.status().as_u16();
    match status {
        200..=299 => Ok(response),
        429 => {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            Err(ModelError::RateLimited { retry_after_secs })
        }
        401 | 403 => Err(ModelError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        )),
        _ => {
            let message = response.text().await.unwrap_or_default();
            warn!(status, body = %message, "Model endpoint returned error");
            Err(ModelError::ApiError {
                status_code: status,
                message,
            })
        }
    }
}

#[async_trait]
impl ModelAdapter for OpenAiCompatModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: GenerateRequest) -> Result<Completion, ModelError> {
        let response = self.send(&request, false).await?;

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ModelError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        Ok(Completion {
            text: choice.message.content.unwrap_or_default(),
            usage: api_response.usage.map(Usage::from),
        })
    }

    async fn stream(&self, request: GenerateRequest) -> Result<Box<dyn TextStream>, ModelError> {
        let response = self.send(&request, true).await?;

        let (tx, rx) = mpsc::channel(64);
        let adapter = self.name.clone();

        // Read the SSE byte stream and forward decoded chunks.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = SseLines::default();

            while let Some(next) = byte_stream.next().await {
                let bytes = match next {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(ModelError::StreamInterrupted(e.to_string()))).await;
                        return;
                    }
                };

                for data in lines.feed(&bytes) {
                    let Some(chunk) = decode_event(&data) else {
                        trace!(adapter = %adapter, data = %data, "Ignoring unparseable SSE chunk");
                        continue;
                    };
                    let done = chunk.done;
                    if tx.send(Ok(chunk)).await.is_err() {
                        // Receiver closed.
                        return;
                    }
                    if done {
                        return;
                    }
                }
            }

            // Stream ended without [DONE].
            let _ = tx
                .send(Ok(StreamChunk {
                    done: true,
                    ..Default::default()
                }))
                .await;
        });

        Ok(Box::new(ChannelTextStream::new(rx)))
    }
}

/// Splits an SSE byte stream into `data:` payloads.
///
/// Bytes are buffered until a full line arrives, so a multi-byte character
/// split across network chunks decodes intact.
#[derive(Default)]
struct SseLines {
    buffer: Vec<u8>,
}

impl SseLines {
    fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut payloads = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            // Blank lines and comments carry no data.
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.trim().to_string());
            }
        }
        payloads
    }
}

/// Decode one `data:` payload. `None` means the payload was not understood.
fn decode_event(data: &str) -> Option<StreamChunk> {
    if data == "[DONE]" {
        return Some(StreamChunk {
            done: true,
            ..Default::default()
        });
    }

    let parsed: StreamResponse = serde_json::from_str(data).ok()?;
    if let Some(usage) = parsed.usage {
        // With include_usage, the usage chunk is the last one before [DONE].
        return Some(StreamChunk {
            content: parsed.choices.into_iter().next().and_then(|c| c.delta.content),
            done: true,
            usage: Some(usage.into()),
        });
    }
    Some(StreamChunk {
        content: parsed.choices.into_iter().next().and_then(|c| c.delta.content),
        done: false,
        usage: None,
    })
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}
