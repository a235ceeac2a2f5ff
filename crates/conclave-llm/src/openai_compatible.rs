//! Client for an OpenAI-compatible chat-completions endpoint (spec: "the LLM
//! proxy, a unifying client over OpenAI-compatible providers" — external
//! collaborator; this is the driver that talks to it).

use crate::client::{ChatStream, LlmClient, LlmClientResult};
use crate::error::LlmClientError;
use crate::types::{ChatRequest, StreamDelta, Usage};
use conclave_core::{FinishReason, Message, Role, ToolDefinition};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct OpenAiCompatibleClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiCompatibleClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(300))
                .build()
                .expect("reqwest client builds with static config"),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for OpenAiCompatibleClient {
    fn name(&self) -> &str {
        "openai_compatible"
    }

    async fn complete_stream(
        &self,
        request: ChatRequest,
        cancel: Option<CancellationToken>,
    ) -> LlmClientResult<ChatStream> {
        let body = WireRequest {
            model: request.model.clone(),
            messages: to_wire_messages(&request.messages, request.system.as_deref()),
            tools: request.tools.as_ref().map(|tools| tools.iter().map(WireTool::from).collect()),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: true,
        };

        debug!(model = %body.model, "dispatching chat completion request");

        let endpoint = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(%status, body = %error_text, "llm proxy returned an error status");
            return Err(match status.as_u16() {
                401 | 403 => LlmClientError::AuthFailed(error_text),
                429 => LlmClientError::RateLimited { retry_after_ms: 60_000 },
                other => LlmClientError::RequestFailed(format!("{other}: {error_text}")),
            });
        }

        let stream = parse_sse_stream(response.bytes_stream(), cancel);
        Ok(Box::pin(stream))
    }
}

/// Translate our append-only `Message` log into OpenAI's wire shape: tool
/// calls live under `function.arguments` (a JSON *string*, not a value), and
/// a leading system message carries the agent's system prompt.
fn to_wire_messages(messages: &[Message], system: Option<&str>) -> Vec<WireMessage> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = system {
        out.push(WireMessage {
            role: "system".to_string(),
            content: Some(system.to_string()),
            name: None,
            tool_call_id: None,
            tool_calls: None,
        });
    }
    for message in messages {
        let role = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        let tool_calls = message.tool_calls.as_ref().map(|calls| {
            calls
                .iter()
                .map(|c| WireToolCall {
                    id: c.id.clone(),
                    kind: "function".to_string(),
                    function: WireFunctionCall {
                        name: c.name.clone(),
                        arguments: serde_json::to_string(&c.arguments).unwrap_or_default(),
                    },
                })
                .collect()
        });
        out.push(WireMessage {
            role: role.to_string(),
            content: message.content.clone(),
            name: message.name.clone(),
            tool_call_id: message.tool_call_id.clone(),
            tool_calls,
        });
    }
    out
}

fn parse_sse_stream(
    bytes_stream: impl futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
    cancel: Option<CancellationToken>,
) -> impl futures::Stream<Item = LlmClientResult<StreamDelta>> + Send {
    async_stream::stream! {
        let mut buffer = String::new();
        let mut tool_calls: Vec<PartialToolCall> = Vec::new();

        tokio::pin!(bytes_stream);

        loop {
            let next_chunk = async {
                bytes_stream.next().await
            };

            let chunk_result = if let Some(cancel) = &cancel {
                tokio::select! {
                    chunk = next_chunk => chunk,
                    _ = cancel.cancelled() => {
                        yield Err(LlmClientError::Cancelled);
                        return;
                    }
                }
            } else {
                next_chunk.await
            };

            let chunk = match chunk_result {
                Some(Ok(c)) => c,
                Some(Err(e)) => {
                    yield Err(LlmClientError::Network(e));
                    continue;
                }
                None => break,
            };

            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(event_end) = buffer.find("\n\n") {
                let event_str = buffer[..event_end].to_string();
                buffer = buffer[event_end + 2..].to_string();

                let data_line = event_str
                    .lines()
                    .find_map(|line| line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")));
                let Some(data) = data_line else { continue };
                let data = data.trim();

                if data == "[DONE]" {
                    yield Ok(StreamDelta::Done {
                        finish_reason: FinishReason::Stop,
                        usage: None,
                    });
                    continue;
                }

                let parsed: WireChunk = match serde_json::from_str(data) {
                    Ok(p) => p,
                    Err(e) => {
                        yield Err(LlmClientError::InvalidResponse(e.to_string()));
                        continue;
                    }
                };

                let Some(choice) = parsed.choices.into_iter().next() else { continue };

                if let Some(content) = choice.delta.content {
                    if !content.is_empty() {
                        yield Ok(StreamDelta::Text(content));
                    }
                }

                for wire_call in choice.delta.tool_calls.unwrap_or_default() {
                    let index = wire_call.index;
                    while tool_calls.len() <= index {
                        tool_calls.push(PartialToolCall::default());
                    }
                    let slot = &mut tool_calls[index];

                    if let Some(id) = wire_call.id {
                        slot.id = id.clone();
                        if let Some(function) = &wire_call.function {
                            if let Some(name) = &function.name {
                                yield Ok(StreamDelta::ToolCallStart {
                                    id: id.clone(),
                                    name: name.clone(),
                                });
                                slot.name = name.clone();
                            }
                        }
                    }
                    if let Some(function) = wire_call.function {
                        if let Some(args) = function.arguments {
                            if !args.is_empty() {
                                yield Ok(StreamDelta::ToolCallDelta {
                                    id: slot.id.clone(),
                                    arguments: args,
                                });
                            }
                        }
                    }
                }

                if let Some(finish_reason) = choice.finish_reason {
                    for call in tool_calls.drain(..) {
                        if !call.id.is_empty() {
                            yield Ok(StreamDelta::ToolCallEnd { id: call.id });
                        }
                    }
                    yield Ok(StreamDelta::Done {
                        finish_reason: map_finish_reason(&finish_reason),
                        usage: parsed.usage.map(|u| Usage {
                            prompt_tokens: u.prompt_tokens,
                            completion_tokens: u.completion_tokens,
                        }),
                    });
                }
            }
        }
    }
}

fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "tool_calls" => FinishReason::ToolCalls,
        _ => FinishReason::Error,
    }
}

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
}

#[derive(Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Serialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionDef,
}

impl From<&ToolDefinition> for WireTool {
    fn from(tool: &ToolDefinition) -> Self {
        WireTool {
            kind: "function",
            function: WireFunctionDef {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.input_schema.clone(),
            },
        }
    }
}

#[derive(Serialize)]
struct WireFunctionDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Deserialize)]
struct WireChunk {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    delta: WireDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireDeltaToolCall>>,
}

#[derive(Deserialize)]
struct WireDeltaToolCall {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireDeltaFunction>,
}

#[derive(Deserialize)]
struct WireDeltaFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
