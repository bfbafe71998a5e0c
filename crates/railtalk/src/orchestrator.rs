//! One chat turn: ask the model, run at most one tool, narrate the result.
//!
//! Every event of a turn goes through an `mpsc` channel in the order the
//! client should see it. The turn ends with a [`TurnOutcome`]; failures are
//! reported to the client as exactly one assistant message.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::{AgentError, AgentResult};
use crate::executor::ToolExecutor;
use crate::models::credentials::Credentials;
use crate::models::message::{model_visible, Message};
use crate::models::tool::{ToolCall, ToolExchange};
use crate::prompt_template::system_prompt;
use crate::providers::base::{Completion, Provider, TextStream};
use crate::registry::ToolRegistry;

pub const NO_ANSWER: &str = "I wasn't able to produce an answer to that.";

pub const FAILURE_PREFIX: &str = "Sorry, I've run into an issue: ";

pub fn failure_text(error: &str) -> String {
    format!("{}{}", FAILURE_PREFIX, error)
}

/// Everything the client sends for one turn
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Turn {
    pub message: String,
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default, rename = "settings")]
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Done,
    Failed(AgentError),
    Cancelled,
}

enum TurnState {
    AwaitingModel,
    AwaitingTool { id: String, call: ToolCall },
    AwaitingFollowup(ToolExchange),
    Streaming(TextStream),
    Done,
}

impl TurnState {
    fn name(&self) -> &'static str {
        match self {
            TurnState::AwaitingModel => "awaiting_model",
            TurnState::AwaitingTool { .. } => "awaiting_tool",
            TurnState::AwaitingFollowup(_) => "awaiting_followup",
            TurnState::Streaming(_) => "streaming",
            TurnState::Done => "done",
        }
    }
}

/// Drives chat turns against a model and a tool executor
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    executor: Arc<dyn ToolExecutor>,
    registry: Arc<ToolRegistry>,
    system_prompt: String,
}

impl Orchestrator {
    /// Create an orchestrator using the built-in system prompt
    pub fn new(
        provider: Arc<dyn Provider>,
        executor: Arc<dyn ToolExecutor>,
        registry: Arc<ToolRegistry>,
    ) -> AgentResult<Self> {
        let system_prompt = system_prompt(&registry, None)
            .map_err(|e| AgentError::Config(format!("Could not render system prompt: {}", e)))?;

        Ok(Self {
            provider,
            executor,
            registry,
            system_prompt,
        })
    }

    pub fn with_system_prompt<S: Into<String>>(mut self, system_prompt: S) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Run one turn, sending events to `events` until the turn ends or `cancel` fires
    pub async fn run(
        &self,
        turn: Turn,
        events: &mpsc::Sender<Message>,
        cancel: CancellationToken,
    ) -> TurnOutcome {
        let mut messages = model_visible(&turn.history);
        messages.push(Message::user(turn.message));

        let result = self
            .drive(&messages, turn.credentials.as_ref(), events, &cancel)
            .await;

        match result {
            Ok(()) => TurnOutcome::Done,
            Err(AgentError::Cancelled) => {
                tracing::info!("turn cancelled");
                TurnOutcome::Cancelled
            }
            Err(_) if cancel.is_cancelled() => TurnOutcome::Cancelled,
            Err(error) => {
                tracing::warn!(error = %error, "turn failed");
                let notice = Message::assistant(failure_text(&error.to_string()));
                if events.send(notice).await.is_err() {
                    tracing::info!("event channel closed before the failure was delivered");
                }
                TurnOutcome::Failed(error)
            }
        }
    }

    async fn drive(
        &self,
        messages: &[Message],
        credentials: Option<&Credentials>,
        events: &mpsc::Sender<Message>,
        cancel: &CancellationToken,
    ) -> AgentResult<()> {
        let tools = self.registry.list_tools();
        let mut state = TurnState::AwaitingModel;

        loop {
            tracing::debug!(state = state.name(), "turn state");
            state = match state {
                TurnState::AwaitingModel => {
                    let completion = cancellable(
                        cancel,
                        self.provider.complete(&self.system_prompt, messages, tools),
                    )
                    .await??;
                    plan(completion)?
                }
                TurnState::AwaitingTool { id, call } => {
                    let notice = Message::status(self.executor.status_notice(&call));
                    emit(events, cancel, notice).await?;

                    let result =
                        cancellable(cancel, self.executor.invoke(&call, credentials)).await??;
                    TurnState::AwaitingFollowup(ToolExchange { id, call, result })
                }
                TurnState::AwaitingFollowup(exchange) => {
                    let stream = cancellable(
                        cancel,
                        self.provider.stream_after_tool(
                            &self.system_prompt,
                            messages,
                            tools,
                            &exchange,
                        ),
                    )
                    .await??;
                    TurnState::Streaming(stream)
                }
                TurnState::Streaming(mut stream) => {
                    let mut emitted = false;
                    while let Some(fragment) = cancellable(cancel, stream.next()).await? {
                        let fragment = fragment?;
                        if fragment.is_empty() {
                            continue;
                        }
                        emit(events, cancel, Message::assistant(fragment)).await?;
                        emitted = true;
                    }
                    if !emitted {
                        emit(events, cancel, Message::assistant(NO_ANSWER)).await?;
                    }
                    TurnState::Done
                }
                TurnState::Done => return Ok(()),
            };
        }
    }
}

/// Decide what follows the first model reply
fn plan(completion: Completion) -> AgentResult<TurnState> {
    let mut requests = completion.tool_requests.into_iter();
    match requests.next() {
        Some(request) => {
            let ignored = requests.count();
            if ignored > 0 {
                tracing::warn!(ignored, "model requested several tools, only the first runs");
            }
            let call = request.tool_call?;
            Ok(TurnState::AwaitingTool {
                id: request.id,
                call,
            })
        }
        None => {
            let text = completion
                .text
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| NO_ANSWER.to_string());
            Ok(TurnState::Streaming(Box::pin(stream::once(async move {
                Ok(text)
            }))))
        }
    }
}

async fn cancellable<F: Future>(cancel: &CancellationToken, future: F) -> AgentResult<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        output = future => Ok(output),
    }
}

/// A closed channel means the client went away, which cancels the turn
async fn emit(
    events: &mpsc::Sender<Message>,
    cancel: &CancellationToken,
    message: Message,
) -> AgentResult<()> {
    match cancellable(cancel, events.send(message)).await? {
        Ok(()) => Ok(()),
        Err(_) => {
            tracing::info!("event channel closed, client disconnected");
            cancel.cancel();
            Err(AgentError::Cancelled)
        }
    }
}
