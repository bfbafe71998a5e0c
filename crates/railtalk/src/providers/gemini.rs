use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::time::Duration;

use super::base::{Completion, Provider, TextStream, Usage};
use super::configs::GeminiProviderConfig;
use super::utils::{check_status, sse_data, tool_request_from_parts};
use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolExchange};

pub struct GeminiProvider {
    client: Client,
    config: GeminiProviderConfig,
}

impl GeminiProvider {
    pub fn new(config: GeminiProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn url(&self, action: &str) -> String {
        format!(
            "{}/v1beta/models/{}:{}",
            self.config.host.trim_end_matches('/'),
            self.config.model,
            action
        )
    }

    fn payload(&self, system: &str, contents: Vec<Value>, tools: &[Tool]) -> Value {
        let mut payload = Map::new();
        payload.insert(
            "systemInstruction".to_string(),
            json!({"parts": [{"text": system}]}),
        );
        payload.insert("contents".to_string(), json!(contents));

        if !tools.is_empty() {
            payload.insert(
                "tools".to_string(),
                json!([{"functionDeclarations": tools_to_gemini_spec(tools)}]),
            );
        }

        let mut generation = Map::new();
        if let Some(temp) = self.config.temperature {
            generation.insert("temperature".to_string(), json!(temp));
        }
        if let Some(tokens) = self.config.max_tokens {
            generation.insert("maxOutputTokens".to_string(), json!(tokens));
        }
        if !generation.is_empty() {
            payload.insert("generationConfig".to_string(), Value::Object(generation));
        }

        Value::Object(payload)
    }

    async fn post(&self, url: String, payload: &Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(payload)
            .send()
            .await?;

        check_status(response, "Gemini").await
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<Completion> {
        let payload = self.payload(system, messages_to_gemini_contents(messages), tools);
        let response: Value = self
            .post(self.url("generateContent"), &payload)
            .await?
            .json()
            .await?;
        gemini_response_to_completion(&response)
    }

    async fn stream_after_tool(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
        exchange: &ToolExchange,
    ) -> Result<TextStream> {
        let mut contents = messages_to_gemini_contents(messages);
        contents.extend(exchange_to_gemini_contents(exchange));

        let payload = self.payload(system, contents, tools);
        let response = self
            .post(self.url("streamGenerateContent?alt=sse"), &payload)
            .await?;

        let fragments = sse_data(response.bytes_stream()).filter_map(|event| async move {
            match event {
                Ok(data) => match serde_json::from_str::<Value>(&data) {
                    Ok(chunk) => gemini_text(&chunk).map(Ok),
                    Err(e) => Some(Err(e.into())),
                },
                Err(e) => Some(Err(e)),
            }
        });
        Ok(Box::pin(fragments))
    }
}

/// Gemini calls the assistant `model` and has no place for status notices
pub fn messages_to_gemini_contents(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .filter_map(|message| {
            let role = match message.role {
                Role::User => "user",
                Role::Assistant => "model",
                Role::Status => return None,
            };
            if message.text.is_empty() {
                return None;
            }
            Some(json!({"role": role, "parts": [{"text": message.text}]}))
        })
        .collect()
}

/// The model's function call followed by the function's response
pub fn exchange_to_gemini_contents(exchange: &ToolExchange) -> Vec<Value> {
    // functionResponse.response has to be an object
    let response = match &exchange.result {
        Value::Object(_) => exchange.result.clone(),
        other => json!({"result": other}),
    };

    vec![
        json!({
            "role": "model",
            "parts": [{"functionCall": {
                "name": exchange.call.name,
                "args": exchange.call.arguments,
            }}]
        }),
        json!({
            "role": "user",
            "parts": [{"functionResponse": {
                "name": exchange.call.name,
                "response": response,
            }}]
        }),
    ]
}

pub fn tools_to_gemini_spec(tools: &[Tool]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "parameters": to_gemini_schema(&tool.input_schema()),
            })
        })
        .collect()
}

/// Gemini spells JSON schema types in upper case
fn to_gemini_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let value = match (key.as_str(), value) {
                        ("type", Value::String(kind)) => Value::String(kind.to_uppercase()),
                        _ => to_gemini_schema(value),
                    };
                    (key.clone(), value)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(to_gemini_schema).collect()),
        other => other.clone(),
    }
}

fn gemini_text(response: &Value) -> Option<String> {
    let parts = response["candidates"][0]["content"]["parts"].as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect();
    (!text.is_empty()).then_some(text)
}

pub fn gemini_response_to_completion(response: &Value) -> Result<Completion> {
    let candidate = match response["candidates"].get(0) {
        Some(candidate) => candidate,
        None => {
            let reason = response["promptFeedback"]["blockReason"]
                .as_str()
                .unwrap_or("no candidates");
            return Err(anyhow!("Gemini returned no reply ({})", reason));
        }
    };

    let mut completion = Completion {
        text: gemini_text(response),
        ..Default::default()
    };

    let parts = candidate["content"]["parts"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    for (index, part) in parts.iter().enumerate() {
        if let Some(call) = part.get("functionCall") {
            let id = call["id"]
                .as_str()
                .map(String::from)
                .unwrap_or_else(|| format!("call_{}", index));
            let name = call["name"].as_str().unwrap_or_default();
            let args = match call.get("args") {
                None | Some(Value::Null) => Ok(json!({})),
                Some(args @ Value::Object(_)) => Ok(args.clone()),
                Some(other) => Err(anyhow!("expected an object, got {}", other)),
            };
            completion
                .tool_requests
                .push(tool_request_from_parts(id, name, args));
        }
    }

    let usage = &response["usageMetadata"];
    Ok(completion.with_usage(Usage::new(
        usage["promptTokenCount"].as_i64().map(|v| v as i32),
        usage["candidatesTokenCount"].as_i64().map(|v| v as i32),
        usage["totalTokenCount"].as_i64().map(|v| v as i32),
    )))
}
