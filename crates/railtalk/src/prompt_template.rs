use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tera::{Context, Error as TeraError, Tera};

use crate::models::tool::Tool;
use crate::registry::ToolRegistry;
use crate::testrail::routes::route_for;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");

/// TestRail's built-in result statuses
pub const STATUSES: [(u8, &str); 5] = [
    (1, "passed"),
    (2, "blocked"),
    (3, "untested"),
    (4, "retest"),
    (5, "failed"),
];

/// Get the path to the prompts directory
fn prompts_dir() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir).join("src").join("prompts")
}

pub fn load_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered)
}

pub fn load_prompt_file<T: Serialize>(
    template_file: impl Into<PathBuf>,
    context_data: &T,
) -> Result<String, TeraError> {
    let template_path = template_file.into();
    // if the template_file doesn't exist, try to load it from the prompts directory
    let file_path = if !template_path.exists() {
        prompts_dir().join(template_path)
    } else {
        template_path
    };

    let template_content = fs::read_to_string(file_path)
        .map_err(|e| TeraError::chain("Failed to read template file", e))?;
    load_prompt(&template_content, context_data)
}

#[derive(Serialize)]
struct Status {
    id: u8,
    label: &'static str,
}

#[derive(Serialize)]
struct SystemContext<'a> {
    tools: &'a [Tool],
    writes: Vec<&'a str>,
    statuses: Vec<Status>,
}

impl<'a> SystemContext<'a> {
    fn new(registry: &'a ToolRegistry) -> Self {
        let writes = registry
            .list_tools()
            .iter()
            .filter(|tool| route_for(&tool.name).is_some_and(|route| route.is_mutation()))
            .map(|tool| tool.name.as_str())
            .collect();
        let statuses = STATUSES
            .iter()
            .map(|(id, label)| Status { id: *id, label })
            .collect();

        SystemContext {
            tools: registry.list_tools(),
            writes,
            statuses,
        }
    }
}

/// Render the system instruction for a registry, from `template_file` when given
pub fn system_prompt(
    registry: &ToolRegistry,
    template_file: Option<PathBuf>,
) -> Result<String, TeraError> {
    let context = SystemContext::new(registry);
    match template_file {
        Some(path) => load_prompt_file(path, &context),
        None => load_prompt(SYSTEM_TEMPLATE, &context),
    }
}
