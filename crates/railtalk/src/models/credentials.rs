use base64::Engine;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{AgentError, AgentResult};

/// TestRail connection settings supplied by the client with every request.
///
/// They live for the duration of one request and are never logged, the
/// `Debug` implementation redacts the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, rename = "url", alias = "baseUrl")]
    pub base_url: String,
    #[serde(default, rename = "email", alias = "identity")]
    pub identity: String,
    #[serde(default, rename = "apiKey", alias = "secret")]
    pub secret: String,
}

impl Credentials {
    pub fn new<U, I, S>(base_url: U, identity: I, secret: S) -> Self
    where
        U: Into<String>,
        I: Into<String>,
        S: Into<String>,
    {
        Credentials {
            base_url: base_url.into(),
            identity: identity.into(),
            secret: secret.into(),
        }
    }

    /// Check every field and return a copy with trimmed values and no trailing
    /// slash on the base url
    pub fn validated(&self) -> AgentResult<Credentials> {
        let base_url = self.base_url.trim().trim_end_matches('/');
        let identity = self.identity.trim();
        let secret = self.secret.trim();

        if base_url.is_empty() || identity.is_empty() || secret.is_empty() {
            return Err(AgentError::Config(
                "TestRail settings are incomplete: url, email and API key are all required"
                    .to_string(),
            ));
        }

        let parsed = Url::parse(base_url).map_err(|e| {
            AgentError::Config(format!("TestRail url '{}' is not valid: {}", base_url, e))
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(AgentError::Config(format!(
                "TestRail url must use http or https, got '{}'",
                parsed.scheme()
            )));
        }

        Ok(Credentials::new(base_url, identity, secret))
    }

    /// The value of the `Authorization` header for HTTP Basic authentication
    pub fn authorization(&self) -> String {
        let raw = format!("{}:{}", self.identity, self.secret);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(raw)
        )
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("base_url", &self.base_url)
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}
