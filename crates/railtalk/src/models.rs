//! These models represent the objects passed around by the assistant
//!
//! There are several related formats we need to interact with:
//! - transcript messages, sent from the browser client and streamed back to it
//! - gemini and openai messages/tools, sent from the orchestrator to the LLM
//! - testrail requests, sent from the adapter to the TestRail REST API
//!
//! We always immediately convert those formats into the internal structs. The
//! wire transcript is intentionally small: a role and a text.
pub mod credentials;
pub mod message;
pub mod role;
pub mod tool;
