use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::sync::Mutex;

use crate::models::message::Message;
use crate::models::tool::{Tool, ToolExchange};
use crate::providers::base::{Completion, Provider, TextStream};

/// One scripted answer to `complete`
pub enum MockCompletion {
    Reply(Completion),
    Error(String),
    /// Never resolves, for cancellation tests
    Pending,
}

/// One scripted answer to `stream_after_tool`
pub enum MockStream {
    Fragments(Vec<String>),
    /// Yields the fragments, then fails mid stream
    FailAfter(Vec<String>, String),
    Error(String),
    /// Yields the fragments, then never ends
    PendingAfter(Vec<String>),
}

/// A mock provider that returns pre-configured responses for testing
#[derive(Default)]
pub struct MockProvider {
    completions: Arc<Mutex<Vec<MockCompletion>>>,
    streams: Arc<Mutex<Vec<MockStream>>>,
    seen: Arc<Mutex<Vec<Vec<Message>>>>,
    exchanges: Arc<Mutex<Vec<ToolExchange>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of completions
    pub fn new(completions: Vec<Completion>) -> Self {
        Self::scripted(
            completions.into_iter().map(MockCompletion::Reply).collect(),
            vec![],
        )
    }

    pub fn scripted(completions: Vec<MockCompletion>, streams: Vec<MockStream>) -> Self {
        Self {
            completions: Arc::new(Mutex::new(completions)),
            streams: Arc::new(Mutex::new(streams)),
            ..Default::default()
        }
    }

    /// Conversations passed to the provider, one entry per call
    pub fn seen(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }

    pub fn exchanges(&self) -> Vec<ToolExchange> {
        self.exchanges.lock().unwrap().clone()
    }
}

fn fragments(items: Vec<String>) -> impl futures::Stream<Item = Result<String>> {
    stream::iter(items.into_iter().map(Ok))
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        _system: &str,
        messages: &[Message],
        _tools: &[Tool],
    ) -> Result<Completion> {
        self.seen.lock().unwrap().push(messages.to_vec());
        let next = {
            let mut completions = self.completions.lock().unwrap();
            if completions.is_empty() {
                None
            } else {
                Some(completions.remove(0))
            }
        };

        match next {
            // Return empty response if no more pre-configured responses
            None => Ok(Completion::text("")),
            Some(MockCompletion::Reply(completion)) => Ok(completion),
            Some(MockCompletion::Error(message)) => Err(anyhow!(message)),
            Some(MockCompletion::Pending) => futures::future::pending().await,
        }
    }

    async fn stream_after_tool(
        &self,
        _system: &str,
        messages: &[Message],
        _tools: &[Tool],
        exchange: &ToolExchange,
    ) -> Result<TextStream> {
        self.seen.lock().unwrap().push(messages.to_vec());
        self.exchanges.lock().unwrap().push(exchange.clone());
        let next = {
            let mut streams = self.streams.lock().unwrap();
            if streams.is_empty() {
                None
            } else {
                Some(streams.remove(0))
            }
        };

        match next {
            None => Ok(Box::pin(stream::empty())),
            Some(MockStream::Fragments(items)) => Ok(Box::pin(fragments(items))),
            Some(MockStream::FailAfter(items, message)) => Ok(Box::pin(
                fragments(items).chain(stream::once(async move { Err(anyhow!(message)) })),
            )),
            Some(MockStream::Error(message)) => Err(anyhow!(message)),
            Some(MockStream::PendingAfter(items)) => {
                Ok(Box::pin(fragments(items).chain(stream::pending())))
            }
        }
    }
}
