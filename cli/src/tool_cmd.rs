//! Formatting shared by the local and remote backends for `tool list`/
//! `tool show`: JSON array/object for `--json`, YAML for the default
//! human-readable form.

use loom::ToolSpec;

use crate::{RunError, ToolShowFormat};

pub(crate) fn print_tools_list(tools: &[ToolSpec], output_json: bool) -> Result<(), RunError> {
    if output_json {
        let values: Vec<serde_json::Value> = tools
            .iter()
            .map(|t| serde_json::json!({ "name": t.name, "description": t.description }))
            .collect();
        println!("{}", serde_json::to_string(&values).map_err(|e| RunError::Local(e.to_string()))?);
    } else {
        for t in tools {
            println!("{}\t{}", t.name, t.description);
        }
    }
    Ok(())
}

pub(crate) fn print_tool_show(tool: &ToolSpec, format: ToolShowFormat) -> Result<(), RunError> {
    match format {
        ToolShowFormat::Json => {
            println!("{}", serde_json::to_string(tool).map_err(|e| RunError::Local(e.to_string()))?);
        }
        ToolShowFormat::Yaml => {
            println!("{}", serde_yaml::to_string(tool).map_err(|e| RunError::Local(e.to_string()))?);
        }
    }
    Ok(())
}
