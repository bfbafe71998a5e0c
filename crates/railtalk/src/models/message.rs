use super::role::Role;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One entry of a chat transcript, and one line of the chat stream
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub text: String,
}

impl Message {
    pub fn new<S: Into<String>>(role: Role, text: S) -> Self {
        Message {
            role,
            text: text.into(),
        }
    }

    /// Create a new user message
    pub fn user<S: Into<String>>(text: S) -> Self {
        Self::new(Role::User, text)
    }

    /// Create a new assistant message
    pub fn assistant<S: Into<String>>(text: S) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Create a new status notice, these never reach the model
    pub fn status<S: Into<String>>(text: S) -> Self {
        Self::new(Role::Status, text)
    }

    pub fn is_status(&self) -> bool {
        self.role == Role::Status
    }
}

/// Remove every entry the model must not see: status notices and empty texts.
///
/// Applying it twice gives the same result as applying it once.
pub fn model_visible(messages: &[Message]) -> Vec<Message> {
    messages
        .iter()
        .filter(|m| !m.is_status() && !m.text.trim().is_empty())
        .cloned()
        .collect()
}
