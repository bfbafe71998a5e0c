use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Method;
use serde_json::{Map, Value};

use crate::errors::{AgentError, AgentResult};
use crate::models::tool::Tool;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{([a-z_]+)\}").unwrap();
}

/// Where a tool lands in the TestRail API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub method: Method,
    /// Endpoint below `/api/v2/`, with `{arg}` placeholders for path arguments
    pub endpoint: &'static str,
}

impl Route {
    fn get(endpoint: &'static str) -> Self {
        Route {
            method: Method::GET,
            endpoint,
        }
    }

    fn post(endpoint: &'static str) -> Self {
        Route {
            method: Method::POST,
            endpoint,
        }
    }

    pub fn is_mutation(&self) -> bool {
        self.method == Method::POST
    }

    /// Names of the path arguments, in order
    pub fn path_params(&self) -> Vec<&'static str> {
        PLACEHOLDER
            .captures_iter(self.endpoint)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect()
    }
}

/// Map a tool name to its TestRail endpoint
pub fn route_for(tool_name: &str) -> Option<Route> {
    let route = match tool_name {
        "get_projects" => Route::get("get_projects"),
        "get_project" => Route::get("get_project/{project_id}"),
        "get_test_runs_for_project" => Route::get("get_runs/{project_id}"),
        "get_run" => Route::get("get_run/{run_id}"),
        "get_tests_for_run" => Route::get("get_tests/{run_id}"),
        "get_results_for_run" => Route::get("get_results_for_run/{run_id}"),
        "get_test_case" => Route::get("get_case/{case_id}"),
        "get_cases_for_project" => Route::get("get_cases/{project_id}"),
        "get_milestones_for_project" => Route::get("get_milestones/{project_id}"),
        "get_suites_for_project" => Route::get("get_suites/{project_id}"),
        "get_statuses" => Route::get("get_statuses"),
        "add_run" => Route::post("add_run/{project_id}"),
        "add_result" => Route::post("add_result/{test_id}"),
        "add_result_for_case" => Route::post("add_result_for_case/{run_id}/{case_id}"),
        "close_run" => Route::post("close_run/{run_id}"),
        _ => return None,
    };
    Some(route)
}

/// A fully resolved TestRail request
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
}

/// Build the request for one tool call.
///
/// TestRail routes everything through `index.php?/api/v2/...`, so filters are
/// appended as `&key=value` after the path, never with a second `?`.
pub fn build_request(
    tool: &Tool,
    route: &Route,
    base_url: &str,
    arguments: &Value,
) -> AgentResult<ApiRequest> {
    let empty = Map::new();
    let args = match arguments {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => {
            return Err(AgentError::InvalidParameters(format!(
                "Arguments for {} must be an object, got {}",
                tool.name, other
            )))
        }
    };

    let path_params = route.path_params();
    let mut endpoint = route.endpoint.to_string();
    for name in &path_params {
        let value = args.get(*name).filter(|v| !v.is_null()).ok_or_else(|| {
            AgentError::InvalidParameters(format!(
                "Missing required argument '{}' for {}",
                name, tool.name
            ))
        })?;
        let id = path_id(name, value)?;
        endpoint = endpoint.replace(&format!("{{{}}}", name), &id);
    }

    for key in args.keys() {
        if tool.param(key).is_none() {
            tracing::debug!(tool = %tool.name, argument = %key, "ignoring undeclared argument");
        }
    }

    let mut query = String::new();
    let mut body = Map::new();
    for param in &tool.params {
        if path_params.iter().any(|p| *p == param.name) {
            continue;
        }
        match args.get(&param.name).filter(|v| !v.is_null()) {
            Some(value) if route.is_mutation() => {
                body.insert(param.name.clone(), value.clone());
            }
            Some(value) => {
                query.push('&');
                query.push_str(&param.name);
                query.push('=');
                query.push_str(&query_value(value));
            }
            None if param.required => {
                return Err(AgentError::InvalidParameters(format!(
                    "Missing required argument '{}' for {}",
                    param.name, tool.name
                )))
            }
            None => {}
        }
    }

    Ok(ApiRequest {
        method: route.method.clone(),
        url: format!("{}/index.php?/api/v2/{}{}", base_url, endpoint, query),
        body: route.is_mutation().then(|| Value::Object(body)),
    })
}

/// Render an id for a path segment. Accepts integers, digit strings, and
/// TestRail's display form with a one letter prefix such as `C123`.
fn path_id(name: &str, value: &Value) -> AgentResult<String> {
    let invalid = || {
        AgentError::InvalidParameters(format!(
            "Argument '{}' must be a TestRail ID, got {}",
            name, value
        ))
    };

    match value {
        Value::Number(n) => {
            if let Some(id) = n.as_u64() {
                Ok(id.to_string())
            } else {
                match n.as_f64() {
                    Some(f) if f >= 0.0 && f.fract() == 0.0 => Ok((f as u64).to_string()),
                    _ => Err(invalid()),
                }
            }
        }
        Value::String(s) => {
            let s = s.trim();
            let digits = match s.chars().next() {
                Some(c) if c.is_ascii_alphabetic() => &s[1..],
                _ => s,
            };
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                Ok(digits.to_string())
            } else {
                Err(invalid())
            }
        }
        _ => Err(invalid()),
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| urlencoding::encode(&scalar(item)).into_owned())
            .collect::<Vec<_>>()
            .join(","),
        other => urlencoding::encode(&scalar(other)).into_owned(),
    }
}
