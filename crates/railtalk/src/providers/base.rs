use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::models::message::Message;
use crate::models::tool::{Tool, ToolExchange, ToolRequest};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// The model's reply to a single, non streamed request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: Option<String>,
    /// Tool calls in the order the model returned them
    pub tool_requests: Vec<ToolRequest>,
    pub usage: Usage,
}

impl Completion {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Completion {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_tool_request(mut self, request: ToolRequest) -> Self {
        self.tool_requests.push(request);
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }
}

/// Incremental text fragments of a streamed reply
pub type TextStream = BoxStream<'static, Result<String>>;

/// Base trait for AI providers (Gemini, OpenAI)
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate the next reply for the conversation, which may request a tool
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<Completion>;

    /// Continue the conversation after a tool ran, streaming the reply text
    async fn stream_after_tool(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
        exchange: &ToolExchange,
    ) -> Result<TextStream>;
}
