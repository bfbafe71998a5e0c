use async_trait::async_trait;
use serde_json::Value;

use crate::errors::AgentResult;
use crate::models::credentials::Credentials;
use crate::models::tool::ToolCall;

/// Executes tool calls requested by the model against an external service
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run one call and return the raw result. No retries.
    async fn invoke(
        &self,
        tool_call: &ToolCall,
        credentials: Option<&Credentials>,
    ) -> AgentResult<Value>;

    /// Text of the status notice shown to the user while the call is in flight
    fn status_notice(&self, tool_call: &ToolCall) -> String {
        format!("Calling {}...", tool_call.name)
    }
}
