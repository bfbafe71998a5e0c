use serde::{Deserialize, Serialize};
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("TestRail API error (status {status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Could not connect to TestRail: {0}")]
    Connection(String),

    #[error("Model request failed: {0}")]
    Model(String),

    #[error("Stream transport error: {0}")]
    Transport(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl AgentError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AgentError::Cancelled)
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        // alternate format keeps the context chain
        AgentError::Model(format!("{:#}", err))
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
