use std::fs;

use anyhow::Result;
use serde_json::json;

use pyrite_domain::{
    write_lockfile, CancelToken, CandidateRepository, EnvironmentFacts, ManifestEditor,
    ProjectSnapshot, Requirement,
};

use crate::context::CommandContext;
use crate::outcome::ExecutionOutcome;

use super::{no_project_outcome, parse_failure_outcome, resolve_failure_outcome, resolve_lockfile};

#[derive(Clone, Debug)]
pub struct AddRequest {
    pub specs: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct RemoveRequest {
    pub names: Vec<String>,
}

/// Adds requirements to the manifest and re-locks. A failed resolution
/// reverts the manifest edit.
///
/// # Errors
/// Returns an error only on unexpected faults; expected failures are
/// reported through the outcome status.
pub fn project_add(ctx: &CommandContext, request: &AddRequest) -> Result<ExecutionOutcome> {
    let snapshot = match ctx.snapshot() {
        Ok(snapshot) => snapshot,
        Err(err) => return Ok(no_project_outcome(&err)),
    };
    // Malformed input is a user fault; report it before touching the
    // interpreter or the network.
    for spec in &request.specs {
        if let Err(err) = Requirement::parse(spec) {
            return Ok(parse_failure_outcome(&err));
        }
    }
    let environment = match ctx.environment(&snapshot) {
        Ok(environment) => environment,
        Err(err) => {
            return Ok(ExecutionOutcome::failure(
                format!("{err:#}"),
                json!({ "kind": "environment-error" }),
            ))
        }
    };
    let repository = match ctx.repository() {
        Ok(repository) => repository,
        Err(err) => {
            return Ok(ExecutionOutcome::failure(
                format!("{err:#}"),
                json!({ "kind": "repository-error" }),
            ))
        }
    };
    add_with(
        &snapshot,
        &request.specs,
        &repository,
        &environment.facts(),
        &ctx.cancel_token(),
    )
}

pub(crate) fn add_with(
    snapshot: &ProjectSnapshot,
    specs: &[String],
    repository: &dyn CandidateRepository,
    facts: &EnvironmentFacts,
    cancel: &CancelToken,
) -> Result<ExecutionOutcome> {
    for spec in specs {
        if let Err(err) = Requirement::parse(spec) {
            return Ok(parse_failure_outcome(&err));
        }
    }
    let original = fs::read_to_string(&snapshot.manifest_path)?;
    let mut editor = ManifestEditor::open(&snapshot.manifest_path)?;
    let report = editor.add_specs(specs)?;

    match relock(snapshot, repository, facts, cancel) {
        Ok(packages) => Ok(ExecutionOutcome::success(
            format!("added {} requirement(s)", specs.len()),
            json!({
                "added": report.added,
                "updated": report.updated,
                "packages": packages,
                "lockfile": snapshot.lock_path.display().to_string(),
            }),
        )),
        Err(outcome) => {
            fs::write(&snapshot.manifest_path, original)?;
            let mut outcome = outcome;
            if let Some(map) = outcome.details.as_object_mut() {
                map.insert("manifest_reverted".to_string(), json!(true));
            }
            Ok(outcome)
        }
    }
}

/// Removes requirements from the manifest and re-locks.
///
/// # Errors
/// Returns an error only on unexpected faults; expected failures are
/// reported through the outcome status.
pub fn project_remove(ctx: &CommandContext, request: &RemoveRequest) -> Result<ExecutionOutcome> {
    let snapshot = match ctx.snapshot() {
        Ok(snapshot) => snapshot,
        Err(err) => return Ok(no_project_outcome(&err)),
    };
    if !names_match_declared(&snapshot, &request.names) {
        return Ok(ExecutionOutcome::user_error(
            format!(
                "no declared dependency matches {}",
                request.names.join(", ")
            ),
            json!({ "names": request.names }),
        ));
    }
    let environment = match ctx.environment(&snapshot) {
        Ok(environment) => environment,
        Err(err) => {
            return Ok(ExecutionOutcome::failure(
                format!("{err:#}"),
                json!({ "kind": "environment-error" }),
            ))
        }
    };
    let repository = match ctx.repository() {
        Ok(repository) => repository,
        Err(err) => {
            return Ok(ExecutionOutcome::failure(
                format!("{err:#}"),
                json!({ "kind": "repository-error" }),
            ))
        }
    };
    remove_with(
        &snapshot,
        &request.names,
        &repository,
        &environment.facts(),
        &ctx.cancel_token(),
    )
}

pub(crate) fn remove_with(
    snapshot: &ProjectSnapshot,
    names: &[String],
    repository: &dyn CandidateRepository,
    facts: &EnvironmentFacts,
    cancel: &CancelToken,
) -> Result<ExecutionOutcome> {
    let original = fs::read_to_string(&snapshot.manifest_path)?;
    let mut editor = ManifestEditor::open(&snapshot.manifest_path)?;
    let report = editor.remove_specs(names)?;
    if report.removed.is_empty() {
        return Ok(ExecutionOutcome::user_error(
            format!("no declared dependency matches {}", names.join(", ")),
            json!({ "names": names }),
        ));
    }

    match relock(snapshot, repository, facts, cancel) {
        Ok(packages) => Ok(ExecutionOutcome::success(
            format!("removed {} requirement(s)", report.removed.len()),
            json!({
                "removed": report.removed,
                "packages": packages,
                "lockfile": snapshot.lock_path.display().to_string(),
            }),
        )),
        Err(outcome) => {
            fs::write(&snapshot.manifest_path, original)?;
            let mut outcome = outcome;
            if let Some(map) = outcome.details.as_object_mut() {
                map.insert("manifest_reverted".to_string(), json!(true));
            }
            Ok(outcome)
        }
    }
}

fn names_match_declared(snapshot: &ProjectSnapshot, names: &[String]) -> bool {
    use pyrite_domain::normalize_name;

    let declared: Vec<String> = snapshot
        .dependencies
        .iter()
        .filter_map(|spec| Requirement::parse(spec).ok())
        .map(|requirement| requirement.normalized().to_string())
        .collect();
    names
        .iter()
        .any(|name| declared.contains(&normalize_name(name)))
}

/// Re-resolves against the just-edited manifest; returns the locked
/// package count or the failure outcome to report after reverting.
fn relock(
    snapshot: &ProjectSnapshot,
    repository: &dyn CandidateRepository,
    facts: &EnvironmentFacts,
    cancel: &CancelToken,
) -> std::result::Result<usize, ExecutionOutcome> {
    let current = ProjectSnapshot::read_from(&snapshot.root)
        .map_err(|err| ExecutionOutcome::failure(format!("{err:#}"), json!({})))?;
    let requirements = current
        .requirements()
        .map_err(|err| parse_failure_outcome(&err))?;
    let lockfile = resolve_lockfile(
        &requirements,
        &requirements,
        repository,
        facts,
        &current.python_requirement,
        cancel,
    )
    .map_err(|err| resolve_failure_outcome(&err))?;
    write_lockfile(&current.lock_path, &lockfile)
        .map_err(|err| ExecutionOutcome::failure(err.to_string(), json!({})))?;
    Ok(lockfile.packages.len())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::outcome::CommandStatus;
    use pyrite_domain::{load_lockfile, validate, ReleaseSpec, StaticRepository};

    fn project(deps: &str) -> (tempfile::TempDir, ProjectSnapshot) {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("pyproject.toml"),
            format!("[project]\nname = \"demo-app\"\ndependencies = {deps}\n"),
        )
        .unwrap();
        let snapshot = ProjectSnapshot::read_from(dir.path()).unwrap();
        (dir, snapshot)
    }

    fn repo() -> StaticRepository {
        let mut repo = StaticRepository::default();
        repo.add(ReleaseSpec::new("demo", "1.0.0"));
        repo.add(ReleaseSpec::new("pytz", "2024.1"));
        repo
    }

    fn facts() -> EnvironmentFacts {
        EnvironmentFacts::testing("3.11.4")
    }

    #[test]
    fn add_updates_manifest_and_lock() {
        let (dir, snapshot) = project("[\"demo>=1\"]");
        let outcome = add_with(
            &snapshot,
            &["pytz".to_string()],
            &repo(),
            &facts(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(outcome.status, CommandStatus::Ok);
        assert_eq!(outcome.details["added"], serde_json::json!(["pytz"]));

        let current = ProjectSnapshot::read_from(dir.path()).unwrap();
        assert!(current.dependencies.contains(&"pytz".to_string()));
        let lock = load_lockfile(&current.lock_path).unwrap();
        assert!(lock.package("pytz").is_some());
        assert!(validate(&current.requirements().unwrap(), &lock));
    }

    #[test]
    fn failed_add_reverts_the_manifest() {
        let (dir, snapshot) = project("[\"demo>=1\"]");
        let outcome = add_with(
            &snapshot,
            &["demo<1".to_string()],
            &repo(),
            &facts(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(outcome.status, CommandStatus::UserError);
        assert_eq!(outcome.details["manifest_reverted"], true);

        let current = ProjectSnapshot::read_from(dir.path()).unwrap();
        assert_eq!(current.dependencies, vec!["demo>=1"]);
    }

    #[test]
    fn malformed_add_spec_fails_before_touching_anything() {
        let (dir, snapshot) = project("[\"demo>=1\"]");
        let outcome = add_with(
            &snapshot,
            &["demo >== 2".to_string()],
            &repo(),
            &facts(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(outcome.status, CommandStatus::UserError);
        let current = ProjectSnapshot::read_from(dir.path()).unwrap();
        assert_eq!(current.dependencies, vec!["demo>=1"]);
        assert!(!current.lock_path.exists());
    }

    #[test]
    fn remove_drops_the_requirement_and_relocks() {
        let (dir, snapshot) = project("[\"demo>=1\", \"pytz\"]");
        let outcome = remove_with(
            &snapshot,
            &["pytz".to_string()],
            &repo(),
            &facts(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(outcome.status, CommandStatus::Ok);

        let current = ProjectSnapshot::read_from(dir.path()).unwrap();
        assert_eq!(current.dependencies, vec!["demo>=1"]);
        let lock = load_lockfile(&current.lock_path).unwrap();
        assert!(lock.package("pytz").is_none());
    }

    #[test]
    fn removing_an_undeclared_name_is_a_user_error() {
        let (_dir, snapshot) = project("[\"demo>=1\"]");
        let outcome = remove_with(
            &snapshot,
            &["ghost".to_string()],
            &repo(),
            &facts(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(outcome.status, CommandStatus::UserError);
    }
}
