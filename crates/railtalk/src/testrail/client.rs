use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::routes::{build_request, route_for};
use crate::errors::{AgentError, AgentResult};
use crate::executor::ToolExecutor;
use crate::models::credentials::Credentials;
use crate::models::tool::{Tool, ToolCall};
use crate::registry::ToolRegistry;

/// Translates tool calls into TestRail REST requests
pub struct TestRailClient {
    client: Client,
    registry: Arc<ToolRegistry>,
}

impl TestRailClient {
    pub fn new(registry: Arc<ToolRegistry>) -> Result<Self> {
        // only the connect phase is bounded, slow reports are allowed to finish
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self { client, registry })
    }

    async fn call(
        &self,
        tool: &Tool,
        arguments: &Value,
        credentials: &Credentials,
    ) -> AgentResult<Value> {
        let route = route_for(&tool.name).ok_or_else(|| {
            AgentError::Config(format!("No TestRail endpoint for tool {}", tool.name))
        })?;
        let credentials = credentials.validated()?;

        let request = build_request(tool, &route, &credentials.base_url, arguments)?;
        tracing::info!(tool = %tool.name, method = %request.method, "calling TestRail");

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .header(AUTHORIZATION, credentials.authorization())
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AgentError::Connection(format!("{} ({})", credentials.base_url, e)))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AgentError::Connection(format!("{} ({})", credentials.base_url, e)))?;

        if !status.is_success() {
            tracing::warn!(tool = %tool.name, status = status.as_u16(), "TestRail returned an error");
            return Err(AgentError::Upstream {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        parse_body(status.as_u16(), &text)
    }
}

#[async_trait]
impl ToolExecutor for TestRailClient {
    async fn invoke(
        &self,
        tool_call: &ToolCall,
        credentials: Option<&Credentials>,
    ) -> AgentResult<Value> {
        let tool = self
            .registry
            .get(&tool_call.name)
            .ok_or_else(|| AgentError::UnknownTool(tool_call.name.clone()))?;
        let credentials = credentials.ok_or_else(|| {
            AgentError::Config("TestRail settings are not configured.".to_string())
        })?;
        self.call(tool, &tool_call.arguments, credentials).await
    }

    fn status_notice(&self, tool_call: &ToolCall) -> String {
        match route_for(&tool_call.name) {
            Some(route) if route.is_mutation() => {
                format!("Sending {} to TestRail...", tool_call.name)
            }
            _ => format!("Fetching data for {} from TestRail...", tool_call.name),
        }
    }
}

/// Pull the human readable message out of a TestRail error body
fn error_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty response>".to_string();
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(json) => match json.get("error").and_then(|e| e.as_str()) {
            Some(message) => message.to_string(),
            None => trimmed.to_string(),
        },
        Err(_) => trimmed.to_string(),
    }
}

// A 2xx that is not JSON came from something other than the TestRail API,
// such as a proxy or a login page
fn parse_body(status: u16, body: &str) -> AgentResult<Value> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|_| AgentError::Upstream {
        status,
        message: "TestRail returned a non-JSON response".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

    /// TestRail puts the whole endpoint in the raw query string
    struct RawQuery(&'static str);

    impl Match for RawQuery {
        fn matches(&self, request: &Request) -> bool {
            request.url.query() == Some(self.0)
        }
    }

    fn client() -> TestRailClient {
        TestRailClient::new(Arc::new(ToolRegistry::testrail().unwrap())).unwrap()
    }

    fn credentials(server: &MockServer) -> Credentials {
        Credentials::new(server.uri(), "qa@example.com", "secret-key")
    }

    #[tokio::test]
    async fn test_get_projects() -> Result<()> {
        let server = MockServer::start().await;
        let authorization = credentials(&server).authorization();
        Mock::given(method("GET"))
            .and(path("/index.php"))
            .and(RawQuery("/api/v2/get_projects"))
            .and(header("Authorization", authorization.as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"id": 1, "name": "Checkout"}])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result = client()
            .invoke(
                &ToolCall::new("get_projects", json!({})),
                Some(&credentials(&server)),
            )
            .await?;
        assert_eq!(result, json!([{"id": 1, "name": "Checkout"}]));
        Ok(())
    }

    #[tokio::test]
    async fn test_filters_reach_testrail() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(RawQuery("/api/v2/get_results_for_run/8&status_id=5&limit=3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .expect(1)
            .mount(&server)
            .await;

        let result = client()
            .invoke(
                &ToolCall::new(
                    "get_results_for_run",
                    json!({"run_id": 8, "status_id": [5], "limit": 3}),
                ),
                Some(&credentials(&server)),
            )
            .await?;
        assert_eq!(result, json!({"results": []}));
        Ok(())
    }

    #[tokio::test]
    async fn test_post_for_mutations() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(RawQuery("/api/v2/add_result_for_case/2/41"))
            .and(body_json(json!({"status_id": 1, "comment": "green"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 900})))
            .expect(1)
            .mount(&server)
            .await;

        let result = client()
            .invoke(
                &ToolCall::new(
                    "add_result_for_case",
                    json!({"run_id": 2, "case_id": 41, "status_id": 1, "comment": "green"}),
                ),
                Some(&credentials(&server)),
            )
            .await?;
        assert_eq!(result["id"], 900);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_tool_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client()
            .invoke(
                &ToolCall::new("delete_everything", json!({})),
                Some(&credentials(&server)),
            )
            .await
            .unwrap_err();
        assert_eq!(err, AgentError::UnknownTool("delete_everything".to_string()));
    }

    #[tokio::test]
    async fn test_structured_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({"error": "Invalid or unknown API key"})),
            )
            .mount(&server)
            .await;

        let err = client()
            .invoke(
                &ToolCall::new("get_projects", json!({})),
                Some(&credentials(&server)),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AgentError::Upstream {
                status: 401,
                message: "Invalid or unknown API key".to_string()
            }
        );
        assert!(err.to_string().contains("Invalid or unknown API key"));
    }

    #[tokio::test]
    async fn test_plain_text_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
            .mount(&server)
            .await;

        let err = client()
            .invoke(
                &ToolCall::new("get_run", json!({"run_id": 1})),
                Some(&credentials(&server)),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AgentError::Upstream {
                status: 503,
                message: "Service Unavailable".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let err = client()
            .invoke(&ToolCall::new("get_projects", json!({})), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let credentials = Credentials::new("http://127.0.0.1:1", "qa@example.com", "key");
        let err = client()
            .invoke(&ToolCall::new("get_projects", json!({})), Some(&credentials))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Connection(_)));
        assert!(err.to_string().contains("Could not connect to TestRail"));
    }

    #[test]
    fn test_status_notice_by_method() {
        let client = client();
        assert_eq!(
            client.status_notice(&ToolCall::new("get_projects", json!({}))),
            "Fetching data for get_projects from TestRail..."
        );
        assert_eq!(
            client.status_notice(&ToolCall::new("add_run", json!({}))),
            "Sending add_run to TestRail..."
        );
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"error": "Field :run_id is invalid"}"#),
            "Field :run_id is invalid"
        );
        assert_eq!(error_message(r#"{"message": "nope"}"#), r#"{"message": "nope"}"#);
        assert_eq!(error_message("  "), "<empty response>");
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(200, ""), Ok(Value::Null));
        assert_eq!(parse_body(200, "[1]"), Ok(json!([1])));
        assert_eq!(
            parse_body(200, "ok"),
            Err(AgentError::Upstream {
                status: 200,
                message: "TestRail returned a non-JSON response".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_html_success_page_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "<html><body>Welcome to nginx!</body></html>",
                "text/html",
            ))
            .mount(&server)
            .await;

        let err = client()
            .invoke(
                &ToolCall::new("get_projects", json!({})),
                Some(&credentials(&server)),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AgentError::Upstream {
                status: 200,
                message: "TestRail returned a non-JSON response".to_string()
            }
        );
    }
}
