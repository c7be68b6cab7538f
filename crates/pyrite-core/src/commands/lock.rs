use anyhow::Result;
use serde_json::json;

use pyrite_domain::{
    write_lockfile, CancelToken, CandidateRepository, EnvironmentFacts, ProjectSnapshot,
};

use crate::context::CommandContext;
use crate::outcome::ExecutionOutcome;
use crate::python::floor_violation;

use super::{no_project_outcome, parse_failure_outcome, resolve_failure_outcome, resolve_lockfile};

/// Resolves the project's requirements and writes `pyrite.lock`.
///
/// # Errors
/// Returns an error only on unexpected faults; expected failures are
/// reported through the outcome status.
pub fn project_lock(ctx: &CommandContext) -> Result<ExecutionOutcome> {
    let snapshot = match ctx.snapshot() {
        Ok(snapshot) => snapshot,
        Err(err) => return Ok(no_project_outcome(&err)),
    };
    let environment = match ctx.environment(&snapshot) {
        Ok(environment) => environment,
        Err(err) => {
            return Ok(ExecutionOutcome::failure(
                format!("{err:#}"),
                json!({ "kind": "environment-error" }),
            ))
        }
    };
    if let Some(violation) = floor_violation(
        &snapshot.python_requirement,
        &environment.interpreter.version,
    ) {
        return Ok(ExecutionOutcome::user_error(
            violation,
            json!({
                "kind": "python-floor-violation",
                "requires_python": snapshot.python_requirement,
            }),
        ));
    }
    let repository = match ctx.repository() {
        Ok(repository) => repository,
        Err(err) => {
            return Ok(ExecutionOutcome::failure(
                format!("{err:#}"),
                json!({ "kind": "repository-error" }),
            ))
        }
    };
    lock_with(
        &snapshot,
        &repository,
        &environment.facts(),
        &ctx.cancel_token(),
    )
}

pub(crate) fn lock_with(
    snapshot: &ProjectSnapshot,
    repository: &dyn CandidateRepository,
    facts: &EnvironmentFacts,
    cancel: &CancelToken,
) -> Result<ExecutionOutcome> {
    let requirements = match snapshot.requirements() {
        Ok(requirements) => requirements,
        Err(err) => return Ok(parse_failure_outcome(&err)),
    };
    match resolve_lockfile(
        &requirements,
        &requirements,
        repository,
        facts,
        &snapshot.python_requirement,
        cancel,
    ) {
        Ok(lockfile) => {
            write_lockfile(&snapshot.lock_path, &lockfile)?;
            Ok(ExecutionOutcome::success(
                format!("wrote {}", snapshot.lock_path.display()),
                json!({
                    "lockfile": snapshot.lock_path.display().to_string(),
                    "packages": lockfile.packages.len(),
                    "content_hash": lockfile.content_hash,
                }),
            ))
        }
        Err(err) => Ok(resolve_failure_outcome(&err)),
    }
}
