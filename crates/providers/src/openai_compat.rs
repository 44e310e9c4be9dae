//! OpenAI-compatible provider implementation.
//!
//! Works with OpenRouter, OpenAI, Ollama, vLLM, DeepSeek, Groq and any other
//! endpoint that speaks `/chat/completions`.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Tool use / function calling
//! - Health checks via `/models`

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use paperclaw_core::error::ProviderError;
use paperclaw_core::message::{Content, Message, MessageToolCall, Role};
use paperclaw_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// OpenRouter (the default backend).
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Local Ollama; no key required.
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama",
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| {
                let text = m.text().into_owned();
                // Assistant turns that only call tools carry `null` content.
                let content = if text.is_empty() && !m.tool_calls.is_empty() {
                    None
                } else {
                    Some(Content::Text(text))
                };

                ApiMessage {
                    role: m.role.as_str().to_string(),
                    content,
                    tool_calls: (!m.tool_calls.is_empty()).then(|| {
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect()
                    }),
                    tool_call_id: m.tool_call_id.clone(),
                }
            })
            .collect()
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": stream,
        });

        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }

    async fn post(
        &self,
        body: &serde_json::Value,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if stream {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        check_status(response).await
    }
}

/// Map non-success HTTP statuses onto provider errors.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
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
            Err(ProviderError::RateLimited { retry_after_secs })
        }
        401 | 403 => Err(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        )),
        _ => {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            })
        }
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let body = Self::request_body(&request, false);
        let response = self.post(&body, false).await?;

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| MessageToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        let message = Message::assistant(choice.message.content.unwrap_or_default())
            .with_tool_calls(tool_calls);

        Ok(ProviderResponse {
            message,
            usage: api_response.usage.map(Usage::from),
            model: api_response.model,
        })
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError>
    {
        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let body = Self::request_body(&request, true);
        let response = self.post(&body, true).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut decoder = SseDecoder::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for item in decoder.feed(&bytes) {
                    let terminal = !matches!(item, Ok(StreamChunk { done: false, .. }));
                    if tx.send(item).await.is_err() {
                        trace!(provider = %provider_name, "Stream receiver dropped");
                        return;
                    }
                    if terminal {
                        return;
                    }
                }
            }

            // Stream ended without [DONE].
            let _ = tx.send(Ok(decoder.finish(None))).await;
        });

        Ok(rx)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// --- SSE decoding ---

/// Incremental decoder for a chat-completions SSE body.
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across network chunks decode correctly. Tool call
/// fragments are accumulated by index and released with the final chunk.
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
    tool_calls: BTreeMap<u32, ToolCallAccumulator>,
}

impl SseDecoder {
    /// Feed raw bytes; returns the chunks completed by them.
    ///
    /// A `done` chunk or an `Err` ends the stream; nothing after it is decoded.
    fn feed(&mut self, bytes: &[u8]) -> Vec<Result<StreamChunk, ProviderError>> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();

        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if let Some(item) = self.decode_line(line) {
                let terminal = !matches!(item, Ok(StreamChunk { done: false, .. }));
                out.push(item);
                if terminal {
                    self.buffer.clear();
                    break;
                }
            }
        }

        out
    }

    fn decode_line(&mut self, line: &str) -> Option<Result<StreamChunk, ProviderError>> {
        if line.is_empty() || line.starts_with(':') {
            return None;
        }
        let data = line.strip_prefix("data:")?.trim();

        if data == "[DONE]" {
            return Some(Ok(self.finish(None)));
        }

        let response = match serde_json::from_str::<StreamResponse>(data) {
            Ok(r) => r,
            Err(e) => {
                trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
                return None;
            }
        };

        if let Some(error) = response.error {
            let message = error["message"]
                .as_str()
                .map(String::from)
                .unwrap_or_else(|| error.to_string());
            return Some(Err(ProviderError::StreamInterrupted(message)));
        }

        let mut content = None;
        if let Some(choice) = response.choices.into_iter().next() {
            for delta in choice.delta.tool_calls.unwrap_or_default() {
                let acc = self.tool_calls.entry(delta.index).or_default();
                if let Some(id) = delta.id {
                    acc.id = id;
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        acc.name = name;
                    }
                    if let Some(args) = function.arguments {
                        acc.arguments.push_str(&args);
                    }
                }
            }
            content = choice.delta.content.filter(|c| !c.is_empty());
        }

        // With `include_usage`, usage arrives in the last chunk before [DONE].
        // Some backends put the last text delta in that same chunk.
        if let Some(usage) = response.usage {
            let mut last = self.finish(Some(usage.into()));
            last.content = content;
            return Some(Ok(last));
        }

        content.map(|text| {
            Ok(StreamChunk {
                content: Some(text),
                tool_calls: Vec::new(),
                done: false,
                usage: None,
            })
        })
    }

    /// The final chunk, carrying every accumulated tool call in index order.
    fn finish(&mut self, usage: Option<Usage>) -> StreamChunk {
        let tool_calls = std::mem::take(&mut self.tool_calls)
            .into_values()
            .map(ToolCallAccumulator::into_tool_call)
            .collect();

        StreamChunk {
            content: None,
            tool_calls,
            done: true,
            usage,
        }
    }
}

/// Accumulates incremental tool call deltas into a complete tool call.
#[derive(Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn into_tool_call(self) -> MessageToolCall {
        MessageToolCall {
            id: self.id,
            name: self.name,
            arguments: self.arguments,
        }
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        Self {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta; arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperclaw_core::message::ContentBlock;

    fn ok_chunks(items: Vec<Result<StreamChunk, ProviderError>>) -> Vec<StreamChunk> {
        items.into_iter().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn constructors_set_base_url() {
        let provider = OpenAiCompatProvider::openrouter("sk-test");
        assert_eq!(provider.name(), "openrouter");
        assert_eq!(provider.base_url(), "https://openrouter.ai/api/v1");

        let local = OpenAiCompatProvider::new("vllm", "http://localhost:8000/v1/", "");
        assert_eq!(local.base_url(), "http://localhost:8000/v1");

        assert!(OpenAiCompatProvider::ollama(None).base_url().contains("11434"));
    }

    #[test]
    fn message_conversion() {
        let messages = vec![
            Message::system("You are a research assistant"),
            Message::user("Draft an abstract"),
            Message::assistant(vec![ContentBlock::text("Line one"), ContentBlock::text("Line two")]),
        ];
        let api = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api.len(), 3);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[1].role, "user");
        assert_eq!(api[2].content, Some(Content::Text("Line one\nLine two".into())));
    }

    #[test]
    fn tool_call_message_has_null_content() {
        let msg = Message::assistant("").with_tool_calls(vec![MessageToolCall {
            id: "call_1".into(),
            name: "render_latex_pdf".into(),
            arguments: r#"{"latex_content":"\\documentclass{article}"}"#.into(),
        }]);
        let json = serde_json::to_value(OpenAiCompatProvider::to_api_messages(&[msg])).unwrap();
        assert!(json[0].get("content").is_none());
        assert_eq!(json[0]["tool_calls"][0]["type"], "function");
        assert_eq!(json[0]["tool_calls"][0]["function"]["name"], "render_latex_pdf");
    }

    #[test]
    fn tool_result_conversion() {
        let msg = Message::tool_result("call_1", "/tmp/output/paper.pdf");
        let api = OpenAiCompatProvider::to_api_messages(&[msg]);
        assert_eq!(api[0].role, "tool");
        assert_eq!(api[0].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn request_body_includes_tools_and_stream_options() {
        let request = ProviderRequest {
            model: "google/gemini-2.5-flash".into(),
            messages: vec![Message::user("hi")],
            temperature: 0.2,
            max_tokens: Some(1024),
            tools: vec![ToolDefinition {
                name: "render_latex_pdf".into(),
                description: "Compile LaTeX".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
            stream: true,
        };

        let body = OpenAiCompatProvider::request_body(&request, true);
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["tools"][0]["function"]["name"], "render_latex_pdf");

        let body = OpenAiCompatProvider::request_body(&request, false);
        assert_eq!(body["stream"], false);
        assert!(body.get("stream_options").is_none());
    }

    #[test]
    fn parse_completion_with_block_content() {
        let data = r#"{
            "model": "google/gemini-2.5-flash",
            "choices": [{"message": {"role": "assistant",
                "content": [{"type": "text", "text": "First"}, {"type": "text", "text": "Second"}]}}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
        }"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        let content = parsed.choices[0].message.content.as_ref().unwrap();
        assert_eq!(content.as_text(), "First\nSecond");
    }

    #[test]
    fn decoder_emits_content_deltas() {
        let mut decoder = SseDecoder::default();
        let chunks = ok_chunks(decoder.feed(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n\
              : keep-alive\n\
              data: {\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":null}]}\n\n",
        ));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content.as_deref(), Some("Hel"));
        assert_eq!(chunks[1].content.as_deref(), Some("lo"));
        assert!(!chunks[1].done);
    }

    #[test]
    fn decoder_handles_lines_split_across_reads() {
        let mut decoder = SseDecoder::default();
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"Müller\"}}]}\n".as_bytes();
        // Split inside the two-byte 'ü'.
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;

        assert!(decoder.feed(&line[..split]).is_empty());
        let chunks = ok_chunks(decoder.feed(&line[split..]));
        assert_eq!(chunks[0].content.as_deref(), Some("Müller"));
    }

    #[test]
    fn decoder_assembles_tool_calls_on_done() {
        let mut decoder = SseDecoder::default();
        let mut items = decoder.feed(
            br#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_abc","function":{"name":"render_latex_pdf","arguments":""}}]}}]}
data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"latex_content\":"}}]}}]}
data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"x\"}"}}]},"finish_reason":"tool_calls"}]}
"#,
        );
        assert!(items.is_empty());

        items = decoder.feed(b"data: [DONE]\n");
        let chunks = ok_chunks(items);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].done);
        assert_eq!(
            chunks[0].tool_calls,
            vec![MessageToolCall {
                id: "call_abc".into(),
                name: "render_latex_pdf".into(),
                arguments: r#"{"latex_content":"x"}"#.into(),
            }]
        );
    }

    #[test]
    fn decoder_orders_parallel_tool_calls_by_index() {
        let mut decoder = SseDecoder::default();
        decoder.feed(
            br#"data: {"choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_b","function":{"name":"second","arguments":"{}"}},{"index":0,"id":"call_a","function":{"name":"first","arguments":"{}"}}]}}]}
"#,
        );
        let done = decoder.finish(None);
        let names: Vec<_> = done.tool_calls.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn decoder_finishes_on_usage_chunk() {
        let mut decoder = SseDecoder::default();
        let chunks = ok_chunks(decoder.feed(
            b"data: {\"choices\":[],\"usage\":{\"prompt_tokens\":10,\"completion_tokens\":5,\"total_tokens\":15}}\n\
              data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n",
        ));
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].done);
        assert_eq!(chunks[0].usage.as_ref().unwrap().total_tokens, 15);
    }

    #[test]
    fn decoder_keeps_text_sent_with_usage() {
        let mut decoder = SseDecoder::default();
        let chunks = ok_chunks(decoder.feed(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\
              data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}],\"usage\":{\"prompt_tokens\":10,\"completion_tokens\":5,\"total_tokens\":15}}\n",
        ));

        let text: String = chunks.iter().filter_map(|c| c.content.as_deref()).collect();
        assert_eq!(text, "Hello world");
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].done);
        assert_eq!(chunks[1].usage.as_ref().unwrap().total_tokens, 15);
    }

    #[test]
    fn decoder_surfaces_mid_stream_errors() {
        let mut decoder = SseDecoder::default();
        let items = decoder.feed(b"data: {\"error\":{\"message\":\"upstream overloaded\",\"code\":502}}\n");
        assert_eq!(items.len(), 1);
        match &items[0] {
            Err(ProviderError::StreamInterrupted(msg)) => assert_eq!(msg, "upstream overloaded"),
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[test]
    fn decoder_skips_garbage() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.feed(b"data: not json\nevent: ping\n\n").is_empty());
    }
}
