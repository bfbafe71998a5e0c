use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Response;
use serde_json::{json, Value};

use crate::errors::AgentError;
use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall, ToolExchange, ToolRequest};
use crate::providers::base::{Completion, Usage};

lazy_static! {
    static ref INVALID_NAME_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
    static ref VALID_NAME: Regex = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
}

/// Turn a non 2xx model API response into an error carrying the API's message
pub async fn check_status(response: Response, provider: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or(body);
    Err(anyhow!(
        "{} request failed with status {}: {}",
        provider,
        status,
        message
    ))
}

/// Split a server-sent-events body into its `data:` payloads.
///
/// Lines may be split across network chunks, so bytes are buffered until a
/// newline arrives. The stream ends at `[DONE]` or when the body ends.
pub fn sse_data<S, E>(body: S) -> BoxStream<'static, Result<String>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    Box::pin(async_stream::try_stream! {
        let mut body = Box::pin(body);
        let mut buffer: Vec<u8> = Vec::new();
        let mut done = false;

        'chunks: while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(anyhow::Error::from)?;
            buffer.extend_from_slice(&chunk);

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                match sse_payload(&line) {
                    SsePayload::Data(data) => yield data,
                    SsePayload::Done => {
                        done = true;
                        break 'chunks;
                    }
                    SsePayload::Skip => {}
                }
            }
        }

        if !done {
            if let SsePayload::Data(data) = sse_payload(&buffer) {
                yield data;
            }
        }
    })
}

enum SsePayload {
    Data(String),
    Done,
    Skip,
}

fn sse_payload(line: &[u8]) -> SsePayload {
    let line = String::from_utf8_lossy(line);
    match line.trim().strip_prefix("data:").map(str::trim) {
        Some("[DONE]") => SsePayload::Done,
        Some("") | None => SsePayload::Skip,
        Some(data) => SsePayload::Data(data.to_string()),
    }
}

pub fn sanitize_function_name(name: &str) -> String {
    INVALID_NAME_CHARS.replace_all(name, "_").to_string()
}

pub fn is_valid_function_name(name: &str) -> bool {
    VALID_NAME.is_match(name)
}

/// Validate a tool call returned by a model, mirroring what the registry accepts
pub fn tool_request_from_parts(id: String, name: &str, arguments: Result<Value>) -> ToolRequest {
    if !is_valid_function_name(name) {
        let error = AgentError::UnknownTool(format!(
            "The provided function name '{}' had invalid characters, it must match this regex [a-zA-Z0-9_-]+",
            name
        ));
        return ToolRequest::new(id, Err(error));
    }

    match arguments {
        Ok(params) => ToolRequest::new(id, Ok(ToolCall::new(name, params))),
        Err(e) => {
            let error = AgentError::InvalidParameters(format!(
                "Could not interpret tool use parameters for id {}: {}",
                id, e
            ));
            ToolRequest::new(id, Err(error))
        }
    }
}

/// Convert transcript messages to OpenAI's API message specification
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .filter_map(|message| match message.role {
            Role::User => Some(json!({"role": "user", "content": message.text})),
            Role::Assistant => Some(json!({"role": "assistant", "content": message.text})),
            Role::Status => None,
        })
        .collect()
}

/// The assistant tool call and the tool result, as two OpenAI messages
pub fn exchange_to_openai_spec(exchange: &ToolExchange) -> Vec<Value> {
    vec![
        json!({
            "role": "assistant",
            "tool_calls": [{
                "id": exchange.id,
                "type": "function",
                "function": {
                    "name": sanitize_function_name(&exchange.call.name),
                    "arguments": exchange.call.arguments.to_string(),
                }
            }]
        }),
        json!({
            "role": "tool",
            "tool_call_id": exchange.id,
            "content": exchange.result.to_string(),
        }),
    ]
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema(),
            }
        }));
    }

    Ok(result)
}

/// Convert OpenAI's API response to a completion
pub fn openai_response_to_completion(response: &Value) -> Result<Completion> {
    let original = response
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| anyhow!("OpenAI response has no choices"))?;
    let mut completion = Completion {
        text: original
            .get("content")
            .and_then(|t| t.as_str())
            .map(String::from),
        ..Default::default()
    };

    if let Some(tool_calls) = original.get("tool_calls").and_then(|t| t.as_array()) {
        for tool_call in tool_calls {
            let id = tool_call["id"].as_str().unwrap_or_default().to_string();
            let function_name = tool_call["function"]["name"].as_str().unwrap_or_default();
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default();
            let params = if arguments.trim().is_empty() {
                Ok(json!({}))
            } else {
                serde_json::from_str::<Value>(arguments).map_err(anyhow::Error::from)
            };
            completion
                .tool_requests
                .push(tool_request_from_parts(id, function_name, params));
        }
    }

    completion.usage = openai_usage(response);
    Ok(completion)
}

fn openai_usage(data: &Value) -> Usage {
    let usage = &data["usage"];
    let input_tokens = usage["prompt_tokens"].as_i64().map(|v| v as i32);
    let output_tokens = usage["completion_tokens"].as_i64().map(|v| v as i32);
    let total_tokens = usage["total_tokens"]
        .as_i64()
        .map(|v| v as i32)
        .or_else(|| match (input_tokens, output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        });
    Usage::new(input_tokens, output_tokens, total_tokens)
}

/// The text delta of one streamed OpenAI chunk, if any
pub fn openai_delta_text(chunk: &Value) -> Option<String> {
    chunk["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(String::from)
}
