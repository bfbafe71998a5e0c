use serde::{Deserialize, Serialize};

/// The author of a transcript entry
///
/// `status` entries are UI-only notices about in-flight tool calls, they are
/// never shown to the model. The browser client historically used `model` and
/// `system` for the last two roles, those names are still accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "model")]
    Assistant,
    #[serde(alias = "system")]
    Status,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Status => "status",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
