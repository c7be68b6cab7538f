use anyhow::Result;
use serde_json::json;

use pyrite_domain::ProjectSnapshot;

use crate::config::{ConfigScope, ConfigStore};
use crate::context::CommandContext;
use crate::outcome::ExecutionOutcome;
use crate::python::{
    discover_interpreters, floor_violation, select_interpreter, DiscoveredInterpreter,
    InterpreterSelector,
};

use super::no_project_outcome;

#[derive(Clone, Debug)]
pub struct UseRequest {
    pub selector: String,
}

/// Binds the project to an interpreter: resolves the selector against the
/// discovered interpreters, reports a `requires-python` violation as a
/// user error, and persists the choice in project-scope config.
///
/// # Errors
/// Returns an error only on unexpected faults; expected failures are
/// reported through the outcome status.
pub fn python_use(
    ctx: &mut CommandContext,
    request: &UseRequest,
) -> Result<ExecutionOutcome> {
    let snapshot = match ctx.snapshot() {
        Ok(snapshot) => snapshot,
        Err(err) => return Ok(no_project_outcome(&err)),
    };
    let discovered = match discover_interpreters() {
        Ok(discovered) => discovered,
        Err(err) => {
            return Ok(ExecutionOutcome::failure(
                err.to_string(),
                json!({ "kind": "environment-error" }),
            ))
        }
    };
    use_with(ctx.config_mut(), &snapshot, &discovered, &request.selector)
}

pub(crate) fn use_with(
    config: &mut ConfigStore,
    snapshot: &ProjectSnapshot,
    discovered: &[DiscoveredInterpreter],
    raw_selector: &str,
) -> Result<ExecutionOutcome> {
    let selector = InterpreterSelector::parse(raw_selector);
    let selected = match select_interpreter(discovered, &selector) {
        Ok(selected) => selected,
        Err(err) => {
            return Ok(ExecutionOutcome::user_error(
                err.to_string(),
                json!({
                    "kind": "no-matching-interpreter",
                    "selector": raw_selector,
                }),
            ))
        }
    };
    if let Some(violation) = floor_violation(&snapshot.python_requirement, &selected.version) {
        return Ok(ExecutionOutcome::user_error(
            violation,
            json!({
                "kind": "python-floor-violation",
                "requires_python": snapshot.python_requirement,
                "interpreter": selected.version.to_string(),
            }),
        ));
    }
    config.set(
        "python.path",
        &selected.path.display().to_string(),
        ConfigScope::Project,
    )?;
    Ok(ExecutionOutcome::success(
        format!(
            "using python {} at {}",
            selected.version,
            selected.path.display()
        ),
        json!({
            "python": selected.path.display().to_string(),
            "version": selected.version.to_string(),
            "packages_dir": format!("__pypackages__/{}/lib", selected.major_minor()),
        }),
    ))
}
