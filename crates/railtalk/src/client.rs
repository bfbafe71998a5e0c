use anyhow::Result;
use futures::StreamExt;
use reqwest::Client;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::errors::{AgentError, AgentResult};
use crate::models::credentials::Credentials;
use crate::orchestrator::{Turn, TurnOutcome};
use crate::session::{SessionEvent, SessionLog, TurnId};
use crate::transport::LineDecoder;

/// Talks to a chat server and feeds its stream into a [`SessionLog`]
pub struct ChatClient {
    client: Client,
    base_url: String,
}

impl ChatClient {
    pub fn new<S: Into<String>>(base_url: S) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Ask the server to check the TestRail settings, returning its confirmation
    pub async fn verify(&self, credentials: &Credentials) -> AgentResult<String> {
        let response = self
            .client
            .post(format!("{}/api/verify", self.base_url))
            .json(credentials)
            .send()
            .await
            .map_err(|e| AgentError::Transport(format!("Could not reach the chat server: {}", e)))?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if status.is_success() {
            Ok(body["message"]
                .as_str()
                .unwrap_or("Connection successful.")
                .to_string())
        } else {
            let message = body["error"]
                .as_str()
                .map(String::from)
                .unwrap_or_else(|| format!("verification failed with status {}", status));
            Err(AgentError::Config(message))
        }
    }

    /// Send one message and apply the streamed answer to `log` until it ends or
    /// `cancel` fires. Cancelling drops the response, closing the connection.
    pub async fn send(
        &self,
        log: &mut SessionLog,
        text: &str,
        credentials: &Credentials,
        cancel: CancellationToken,
    ) -> TurnOutcome {
        let request = Turn {
            message: text.to_string(),
            history: log.history(),
            credentials: Some(credentials.clone()),
        };
        let turn = log.begin_turn(text);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            result = self.stream_turn(log, turn, &request) => result,
        };

        match result {
            Ok(()) => {
                log.apply(turn, SessionEvent::Finished);
                TurnOutcome::Done
            }
            Err(AgentError::Cancelled) => {
                log.apply(turn, SessionEvent::Cancelled);
                TurnOutcome::Cancelled
            }
            Err(error) => {
                let message = match &error {
                    AgentError::Transport(message) => message.clone(),
                    other => other.to_string(),
                };
                log.apply(turn, SessionEvent::Failed(message));
                TurnOutcome::Failed(error)
            }
        }
    }

    async fn stream_turn(
        &self,
        log: &mut SessionLog,
        turn: TurnId,
        request: &Turn,
    ) -> AgentResult<()> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| AgentError::Transport(format!("Could not reach the chat server: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AgentError::Transport(format!(
                "Server responded with an error: {} {}",
                status.as_u16(),
                text
            )));
        }

        let mut decoder = LineDecoder::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk =
                chunk.map_err(|e| AgentError::Transport(format!("Chat stream interrupted: {}", e)))?;
            for message in decoder.push(&chunk) {
                log.apply(turn, SessionEvent::Line(message));
            }
        }
        if let Some(message) = decoder.finish() {
            log.apply(turn, SessionEvent::Line(message));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::Message;
    use crate::session::CANCELLED_NOTICE;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> Credentials {
        Credentials::new("https://example.testrail.io", "qa@example.com", "key")
    }

    #[tokio::test]
    async fn test_send_applies_stream() {
        let server = MockServer::start().await;
        let body = concat!(
            "{\"role\":\"status\",\"text\":\"Fetching data for get_projects from TestRail...\"}\n",
            "{\"role\":\"assistant\",\"text\":\"You have \"}\n",
            "{\"role\":\"assistant\",\"text\":\"1 project.\"}",
        );
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({
                "message": "List my projects",
                "history": [{"role": "assistant", "text": "Hello!"}],
                "settings": {"url": "https://example.testrail.io", "email": "qa@example.com", "apiKey": "key"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/plain"))
            .expect(1)
            .mount(&server)
            .await;

        let client = ChatClient::new(server.uri()).unwrap();
        let mut log = SessionLog::with_greeting("Hello!");
        let outcome = client
            .send(&mut log, "List my projects", &credentials(), CancellationToken::new())
            .await;

        assert_eq!(outcome, TurnOutcome::Done);
        assert_eq!(
            log.messages(),
            vec![
                Message::assistant("Hello!"),
                Message::user("List my projects"),
                Message::assistant("You have 1 project."),
            ]
        );
    }

    #[tokio::test]
    async fn test_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = ChatClient::new(server.uri()).unwrap();
        let mut log = SessionLog::new();
        let outcome = client
            .send(&mut log, "hi", &credentials(), CancellationToken::new())
            .await;

        assert!(matches!(outcome, TurnOutcome::Failed(AgentError::Transport(_))));
        assert_eq!(
            log.messages().last().unwrap().text,
            "Sorry, I've run into an issue: Server responded with an error: 500 boom"
        );
    }

    #[tokio::test]
    async fn test_cancel_drops_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("{\"role\":\"assistant\",\"text\":\"late\"}\n", "text/plain")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client = ChatClient::new(server.uri()).unwrap();
        let mut log = SessionLog::new();
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let outcome = client.send(&mut log, "hi", &credentials(), cancel).await;

        assert_eq!(outcome, TurnOutcome::Cancelled);
        assert_eq!(
            log.messages(),
            vec![Message::user("hi"), Message::assistant(CANCELLED_NOTICE)]
        );
    }

    #[tokio::test]
    async fn test_verify() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/verify"))
            .and(body_partial_json(json!({"email": "qa@example.com"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"message": "Connection successful."})),
            )
            .mount(&server)
            .await;

        let client = ChatClient::new(server.uri()).unwrap();
        assert_eq!(
            client.verify(&credentials()).await.unwrap(),
            "Connection successful."
        );
    }

    #[tokio::test]
    async fn test_verify_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/verify"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"error": "TestRail API error (status 401): bad key"})),
            )
            .mount(&server)
            .await;

        let client = ChatClient::new(server.uri()).unwrap();
        let err = client.verify(&credentials()).await.unwrap_err();
        assert_eq!(
            err,
            AgentError::Config("TestRail API error (status 401): bad key".to_string())
        );
    }
}
