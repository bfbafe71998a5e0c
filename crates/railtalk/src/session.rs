//! Client side view of a conversation.
//!
//! The log is a reducer: each stream event is applied to the turn it belongs
//! to, identified by the index returned from [`SessionLog::begin_turn`]. Once a
//! turn is closed any late event for it is dropped.

use crate::models::message::{model_visible, Message};
use crate::models::role::Role;
use crate::orchestrator::{failure_text, FAILURE_PREFIX};

pub const CANCELLED_NOTICE: &str = "Request cancelled by user.";

pub type TurnId = usize;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// One decoded line of the chat stream
    Line(Message),
    Finished,
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    turn: Option<TurnId>,
    message: Message,
}

#[derive(Debug, Default)]
pub struct SessionLog {
    entries: Vec<Entry>,
    /// `true` while the turn at that index is still receiving events
    pending: Vec<bool>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the log with an assistant greeting that belongs to no turn
    pub fn with_greeting<S: Into<String>>(text: S) -> Self {
        SessionLog {
            entries: vec![Entry {
                turn: None,
                message: Message::assistant(text),
            }],
            pending: vec![],
        }
    }

    pub fn begin_turn<S: Into<String>>(&mut self, text: S) -> TurnId {
        let turn = self.pending.len();
        self.pending.push(true);
        self.entries.push(Entry {
            turn: Some(turn),
            message: Message::user(text),
        });
        turn
    }

    pub fn is_pending(&self, turn: TurnId) -> bool {
        self.pending.get(turn).copied().unwrap_or(false)
    }

    /// Apply one event, returning false when it was dropped
    pub fn apply(&mut self, turn: TurnId, event: SessionEvent) -> bool {
        if !self.is_pending(turn) {
            tracing::debug!(turn, ?event, "dropping event for a closed turn");
            return false;
        }

        match event {
            SessionEvent::Line(message) => match message.role {
                Role::Status => {
                    self.remove(turn, |m| m.is_status());
                    self.push(turn, message);
                }
                // a failure notice ends the turn and is never merged into the answer
                Role::Assistant if message.text.starts_with(FAILURE_PREFIX) => {
                    self.push(turn, message);
                }
                Role::Assistant => match self.position(turn, Role::Assistant) {
                    Some(index) => self.entries[index].message.text.push_str(&message.text),
                    None => self.push(turn, message),
                },
                Role::User => {
                    tracing::warn!(turn, "ignoring user line in the chat stream");
                    return false;
                }
            },
            SessionEvent::Finished => {
                self.remove(turn, |m| m.is_status());
                self.close(turn);
            }
            SessionEvent::Failed(error) => {
                self.remove(turn, |m| m.is_status());
                self.push(turn, Message::assistant(failure_text(&error)));
                self.close(turn);
            }
            SessionEvent::Cancelled => {
                self.remove(turn, |m| {
                    m.is_status() || (m.role == Role::Assistant && m.text.is_empty())
                });
                self.push(turn, Message::assistant(CANCELLED_NOTICE));
                self.close(turn);
            }
        }
        true
    }

    /// Transcript for the next request, without status notices
    pub fn history(&self) -> Vec<Message> {
        model_visible(&self.messages())
    }

    /// Everything currently visible, in order
    pub fn messages(&self) -> Vec<Message> {
        self.entries.iter().map(|e| e.message.clone()).collect()
    }

    fn push(&mut self, turn: TurnId, message: Message) {
        self.entries.push(Entry {
            turn: Some(turn),
            message,
        });
    }

    fn position(&self, turn: TurnId, role: Role) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.turn == Some(turn) && e.message.role == role)
    }

    fn remove<F: Fn(&Message) -> bool>(&mut self, turn: TurnId, predicate: F) {
        self.entries
            .retain(|e| e.turn != Some(turn) || !predicate(&e.message));
    }

    fn close(&mut self, turn: TurnId) {
        if let Some(pending) = self.pending.get_mut(turn) {
            *pending = false;
        }
    }
}
