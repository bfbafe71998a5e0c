use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{Completion, Provider, TextStream};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    check_status, exchange_to_openai_spec, messages_to_openai_spec, openai_delta_text,
    openai_response_to_completion, sse_data, tools_to_openai_spec,
};
use crate::models::message::Message;
use crate::models::tool::{Tool, ToolExchange};

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        )
    }

    fn payload(&self, system: &str, messages: Vec<Value>, tools: &[Tool]) -> Result<Value> {
        // create messages array with system message first
        let mut messages_array = vec![json!({"role": "system", "content": system})];
        messages_array.extend(messages);

        let mut payload = serde_json::Map::new();
        payload.insert("model".to_string(), json!(self.config.model));
        payload.insert("messages".to_string(), json!(messages_array));

        if !tools.is_empty() {
            payload.insert("tools".to_string(), json!(tools_to_openai_spec(tools)?));
        }
        if let Some(temp) = self.config.temperature {
            payload.insert("temperature".to_string(), json!(temp));
        }
        if let Some(tokens) = self.config.max_tokens {
            payload.insert("max_tokens".to_string(), json!(tokens));
        }

        Ok(Value::Object(payload))
    }

    async fn post(&self, payload: &Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.url())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(payload)
            .send()
            .await?;

        check_status(response, "OpenAI").await
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<Completion> {
        let payload = self.payload(system, messages_to_openai_spec(messages), tools)?;
        let response: Value = self.post(&payload).await?.json().await?;
        openai_response_to_completion(&response)
    }

    async fn stream_after_tool(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
        exchange: &ToolExchange,
    ) -> Result<TextStream> {
        let mut messages_spec = messages_to_openai_spec(messages);
        messages_spec.extend(exchange_to_openai_spec(exchange));

        let mut payload = self.payload(system, messages_spec, tools)?;
        if let Some(object) = payload.as_object_mut() {
            object.insert("stream".to_string(), json!(true));
        }

        let response = self.post(&payload).await?;
        let fragments = sse_data(response.bytes_stream()).filter_map(|event| async move {
            match event {
                Ok(data) => match serde_json::from_str::<Value>(&data) {
                    Ok(chunk) => openai_delta_text(&chunk).map(Ok),
                    Err(e) => Some(Err(e.into())),
                },
                Err(e) => Some(Err(e)),
            }
        });
        Ok(Box::pin(fragments))
    }
}
