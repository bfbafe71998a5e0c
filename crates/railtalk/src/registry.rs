use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{ParamKind, Tool, ToolParam};

lazy_static! {
    static ref TOOL_NAME: Regex = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
}

/// The catalogue of tools exposed to the model.
///
/// Built once at startup and shared read-only between all requests.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<Tool>) -> AgentResult<Self> {
        let mut seen = HashSet::new();
        for tool in &tools {
            if !TOOL_NAME.is_match(&tool.name) {
                return Err(AgentError::Config(format!(
                    "Tool name '{}' must match [a-zA-Z0-9_-]+",
                    tool.name
                )));
            }
            if !seen.insert(tool.name.as_str()) {
                return Err(AgentError::Config(format!(
                    "Duplicate tool name: {}",
                    tool.name
                )));
            }
        }
        Ok(Self { tools })
    }

    /// The built-in TestRail catalogue
    pub fn testrail() -> AgentResult<Self> {
        Self::new(testrail_tools())
    }

    pub fn list_tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }
}

fn id_param(name: &str, what: &str) -> ToolParam {
    ToolParam::required(
        name,
        ParamKind::Integer,
        format!("The ID of the {} in TestRail.", what),
    )
}

fn status_filter() -> ToolParam {
    ToolParam::optional(
        "status_id",
        ParamKind::Array,
        "Only include entries with these status IDs (1=passed, 2=blocked, 3=untested, 4=retest, 5=failed).",
    )
    .with_items(ParamKind::Integer)
}

fn result_params(tool: Tool) -> Tool {
    tool.with_param(ToolParam::required(
        "status_id",
        ParamKind::Integer,
        "The status of the result: 1=passed, 2=blocked, 4=retest, 5=failed.",
    ))
    .with_param(ToolParam::optional(
        "comment",
        ParamKind::String,
        "A comment describing the result.",
    ))
    .with_param(ToolParam::optional(
        "elapsed",
        ParamKind::String,
        "The time it took to execute the test, e.g. \"30s\" or \"1m 45s\".",
    ))
    .with_param(ToolParam::optional(
        "version",
        ParamKind::String,
        "The version or build the test was executed against.",
    ))
}

fn testrail_tools() -> Vec<Tool> {
    vec![
        Tool::new("get_projects", "Gets a list of all projects from TestRail.").with_param(
            ToolParam::optional(
                "is_completed",
                ParamKind::Boolean,
                "true to return completed projects only, false for active projects only.",
            ),
        ),
        Tool::new("get_project", "Gets the details of a single project from TestRail.")
            .with_param(id_param("project_id", "project")),
        Tool::new(
            "get_test_runs_for_project",
            "Gets a list of test runs for a specific project from TestRail.",
        )
        .with_param(id_param("project_id", "project"))
        .with_param(ToolParam::optional(
            "is_completed",
            ParamKind::Boolean,
            "true to return completed runs only, false for active runs only.",
        ))
        .with_param(ToolParam::optional(
            "milestone_id",
            ParamKind::Integer,
            "Only return runs that belong to this milestone.",
        ))
        .with_param(ToolParam::optional(
            "limit",
            ParamKind::Integer,
            "The maximum number of runs to return.",
        ))
        .with_param(ToolParam::optional(
            "offset",
            ParamKind::Integer,
            "Skip this many runs, for paging.",
        )),
        Tool::new("get_run", "Gets the details of a single test run from TestRail.")
            .with_param(id_param("run_id", "test run")),
        Tool::new(
            "get_tests_for_run",
            "Gets a list of tests for a specific test run from TestRail.",
        )
        .with_param(id_param("run_id", "test run"))
        .with_param(status_filter()),
        Tool::new(
            "get_results_for_run",
            "Gets a list of results for a specific test run from TestRail.",
        )
        .with_param(id_param("run_id", "test run"))
        .with_param(status_filter())
        .with_param(ToolParam::optional(
            "limit",
            ParamKind::Integer,
            "The maximum number of results to return.",
        )),
        Tool::new(
            "get_test_case",
            "Gets details for a specific test case from TestRail.",
        )
        .with_param(ToolParam::required(
            "case_id",
            ParamKind::Integer,
            "The ID of the test case in TestRail (e.g., C123).",
        )),
        Tool::new(
            "get_cases_for_project",
            "Gets a list of test cases for a project, optionally narrowed to a suite or section.",
        )
        .with_param(id_param("project_id", "project"))
        .with_param(ToolParam::optional(
            "suite_id",
            ParamKind::Integer,
            "The ID of the test suite, required for projects with multiple suites.",
        ))
        .with_param(ToolParam::optional(
            "section_id",
            ParamKind::Integer,
            "Only return cases of this section.",
        ))
        .with_param(ToolParam::optional(
            "limit",
            ParamKind::Integer,
            "The maximum number of cases to return.",
        )),
        Tool::new(
            "get_milestones_for_project",
            "Gets a list of milestones for a specific project from TestRail.",
        )
        .with_param(id_param("project_id", "project"))
        .with_param(ToolParam::optional(
            "is_completed",
            ParamKind::Boolean,
            "true to return completed milestones only, false for open milestones only.",
        )),
        Tool::new(
            "get_suites_for_project",
            "Gets a list of test suites for a specific project from TestRail.",
        )
        .with_param(id_param("project_id", "project")),
        Tool::new(
            "get_statuses",
            "Gets the list of available test statuses, including custom ones.",
        ),
        Tool::new("add_run", "Creates a new test run in a project.")
            .with_param(id_param("project_id", "project"))
            .with_param(ToolParam::required(
                "name",
                ParamKind::String,
                "The name of the test run.",
            ))
            .with_param(ToolParam::optional(
                "description",
                ParamKind::String,
                "The description of the test run.",
            ))
            .with_param(ToolParam::optional(
                "suite_id",
                ParamKind::Integer,
                "The ID of the test suite, required for projects with multiple suites.",
            ))
            .with_param(ToolParam::optional(
                "milestone_id",
                ParamKind::Integer,
                "The ID of the milestone to link the run to.",
            ))
            .with_param(ToolParam::optional(
                "include_all",
                ParamKind::Boolean,
                "true to include all cases of the suite, false to use case_ids.",
            ))
            .with_param(
                ToolParam::optional(
                    "case_ids",
                    ParamKind::Array,
                    "The case IDs to include when include_all is false.",
                )
                .with_items(ParamKind::Integer),
            ),
        result_params(
            Tool::new("add_result", "Records a new result for a test.")
                .with_param(id_param("test_id", "test")),
        ),
        result_params(
            Tool::new(
                "add_result_for_case",
                "Records a new result for a test case inside a test run.",
            )
            .with_param(id_param("run_id", "test run"))
            .with_param(id_param("case_id", "test case")),
        ),
        Tool::new("close_run", "Closes a test run and archives its tests and results.")
            .with_param(id_param("run_id", "test run")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_testrail_catalogue_is_valid() {
        let registry = ToolRegistry::testrail().unwrap();
        assert!(registry.get("get_projects").is_some());
        assert!(registry.get("add_result_for_case").is_some());
        assert!(registry.get("delete_project").is_none());
    }

    #[test]
    fn test_list_tools_is_deterministic() {
        let first = ToolRegistry::testrail().unwrap();
        let second = ToolRegistry::testrail().unwrap();
        assert_eq!(first.list_tools(), second.list_tools());
        assert_eq!(first.names()[0], "get_projects");
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = ToolRegistry::new(vec![
            Tool::new("get_projects", "one"),
            Tool::new("get_projects", "two"),
        ]);
        let err = result.unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
        assert!(err.to_string().contains("Duplicate tool name"));
    }

    #[test]
    fn test_invalid_names_rejected() {
        let result = ToolRegistry::new(vec![Tool::new("get projects", "bad")]);
        assert!(matches!(result, Err(AgentError::Config(_))));
    }

    #[test]
    fn test_get_projects_has_no_required_args() {
        let registry = ToolRegistry::testrail().unwrap();
        let tool = registry.get("get_projects").unwrap();
        assert!(tool.params.iter().all(|p| !p.required));
    }
}
