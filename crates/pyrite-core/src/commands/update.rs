use std::collections::BTreeSet;

use anyhow::Result;
use serde_json::{json, Value};

use pyrite_domain::{
    load_lockfile, normalize_name, write_lockfile, CancelToken, CandidateRepository,
    EnvironmentFacts, Lockfile, LockfileError, ProjectSnapshot, Requirement,
};

use crate::context::CommandContext;
use crate::outcome::ExecutionOutcome;

use super::{no_project_outcome, parse_failure_outcome, resolve_failure_outcome, resolve_lockfile};

#[derive(Clone, Debug, Default)]
pub struct UpdateRequest {
    pub names: Vec<String>,
}

/// Refreshes locked versions. Without names the whole requirement set is
/// re-resolved from scratch; with names every other locked package stays
/// pinned to its locked version and only the named packages move.
///
/// # Errors
/// Returns an error only on unexpected faults; expected failures are
/// reported through the outcome status.
pub fn project_update(ctx: &CommandContext, request: &UpdateRequest) -> Result<ExecutionOutcome> {
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
    let repository = match ctx.repository() {
        Ok(repository) => repository,
        Err(err) => {
            return Ok(ExecutionOutcome::failure(
                format!("{err:#}"),
                json!({ "kind": "repository-error" }),
            ))
        }
    };
    update_with(
        &snapshot,
        &request.names,
        &repository,
        &environment.facts(),
        &ctx.cancel_token(),
    )
}

pub(crate) fn update_with(
    snapshot: &ProjectSnapshot,
    names: &[String],
    repository: &dyn CandidateRepository,
    facts: &EnvironmentFacts,
    cancel: &CancelToken,
) -> Result<ExecutionOutcome> {
    let requirements = match snapshot.requirements() {
        Ok(requirements) => requirements,
        Err(err) => return Ok(parse_failure_outcome(&err)),
    };
    let previous = match load_lockfile(&snapshot.lock_path) {
        Ok(lock) => Some(lock),
        Err(LockfileError::Missing(_)) => None,
        Err(err) => {
            return Ok(ExecutionOutcome::failure(
                err.to_string(),
                json!({ "kind": "lockfile-error" }),
            ))
        }
    };

    let (roots, mode) = if names.is_empty() {
        (requirements.clone(), "all")
    } else {
        let Some(previous) = previous.as_ref() else {
            return Ok(ExecutionOutcome::user_error(
                "no lockfile to update; run `pyrite lock` first",
                json!({ "hint": "run `pyrite lock`" }),
            ));
        };
        let targets: BTreeSet<String> = names.iter().map(|name| normalize_name(name)).collect();
        for target in &targets {
            if previous.package(target).is_none() {
                return Ok(ExecutionOutcome::user_error(
                    format!("`{target}` is not a locked package"),
                    json!({ "package": target }),
                ));
            }
        }
        // Everything outside the named set keeps its locked version.
        let mut roots = requirements.clone();
        for package in &previous.packages {
            if targets.contains(&package.name) || package.source.is_some() {
                continue;
            }
            if let Ok(pin) = Requirement::parse(&format!("{}=={}", package.name, package.version))
            {
                roots.push(pin);
            }
        }
        (roots, "selected")
    };

    match resolve_lockfile(
        &roots,
        &requirements,
        repository,
        facts,
        &snapshot.python_requirement,
        cancel,
    ) {
        Ok(lockfile) => {
            write_lockfile(&snapshot.lock_path, &lockfile)?;
            let changed = version_changes(previous.as_ref(), &lockfile);
            Ok(ExecutionOutcome::success(
                format!("updated {} package(s)", changed.len()),
                json!({
                    "mode": mode,
                    "changed": changed,
                    "packages": lockfile.packages.len(),
                    "lockfile": snapshot.lock_path.display().to_string(),
                }),
            ))
        }
        Err(err) => Ok(resolve_failure_outcome(&err)),
    }
}

fn version_changes(previous: Option<&Lockfile>, current: &Lockfile) -> Vec<Value> {
    let mut changes = Vec::new();
    for package in &current.packages {
        let before = previous.and_then(|lock| lock.package(&package.name));
        match before {
            None => changes.push(json!({
                "name": package.name,
                "from": Value::Null,
                "to": package.version,
            })),
            Some(before) if before.version != package.version => changes.push(json!({
                "name": package.name,
                "from": before.version,
                "to": package.version,
            })),
            Some(_) => {}
        }
    }
    if let Some(previous) = previous {
        for package in &previous.packages {
            if current.package(&package.name).is_none() {
                changes.push(json!({
                    "name": package.name,
                    "from": package.version,
                    "to": Value::Null,
                }));
            }
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::commands::lock::lock_with;
    use crate::outcome::CommandStatus;
    use pyrite_domain::{validate, ReleaseSpec, StaticRepository};

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

    fn old_repo() -> StaticRepository {
        let mut repo = StaticRepository::default();
        repo.add(ReleaseSpec::new("demo", "1.0.0"));
        repo.add(ReleaseSpec::new("pytz", "2024.1"));
        repo
    }

    fn new_repo() -> StaticRepository {
        let mut repo = old_repo();
        repo.add(ReleaseSpec::new("demo", "2.0.0"));
        repo.add(ReleaseSpec::new("pytz", "2024.2"));
        repo
    }

    fn facts() -> EnvironmentFacts {
        EnvironmentFacts::testing("3.11.4")
    }

    #[test]
    fn update_without_names_reresolves_everything() {
        let (_dir, snapshot) = project("[\"demo>=1\", \"pytz\"]");
        lock_with(&snapshot, &old_repo(), &facts(), &CancelToken::new()).unwrap();

        let outcome = update_with(&snapshot, &[], &new_repo(), &facts(), &CancelToken::new())
            .unwrap();
        assert_eq!(outcome.status, CommandStatus::Ok);
        assert_eq!(outcome.details["mode"], "all");

        let lock = load_lockfile(&snapshot.lock_path).unwrap();
        assert_eq!(lock.package("demo").unwrap().version, "2.0.0");
        assert_eq!(lock.package("pytz").unwrap().version, "2024.2");
        assert!(validate(&snapshot.requirements().unwrap(), &lock));
    }

    #[test]
    fn named_update_moves_only_the_named_package() {
        let (_dir, snapshot) = project("[\"demo>=1\", \"pytz\"]");
        lock_with(&snapshot, &old_repo(), &facts(), &CancelToken::new()).unwrap();

        let outcome = update_with(
            &snapshot,
            &["demo".to_string()],
            &new_repo(),
            &facts(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(outcome.status, CommandStatus::Ok);
        assert_eq!(outcome.details["mode"], "selected");

        let lock = load_lockfile(&snapshot.lock_path).unwrap();
        assert_eq!(lock.package("demo").unwrap().version, "2.0.0");
        assert_eq!(
            lock.package("pytz").unwrap().version,
            "2024.1",
            "unnamed packages stay pinned"
        );
        assert!(
            validate(&snapshot.requirements().unwrap(), &lock),
            "hash still covers the declared set only"
        );
    }

    #[test]
    fn named_update_requires_an_existing_lock() {
        let (_dir, snapshot) = project("[\"demo>=1\"]");
        let outcome = update_with(
            &snapshot,
            &["demo".to_string()],
            &new_repo(),
            &facts(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(outcome.status, CommandStatus::UserError);
    }

    #[test]
    fn named_update_rejects_unlocked_packages() {
        let (_dir, snapshot) = project("[\"demo>=1\"]");
        lock_with(&snapshot, &old_repo(), &facts(), &CancelToken::new()).unwrap();
        let outcome = update_with(
            &snapshot,
            &["ghost".to_string()],
            &new_repo(),
            &facts(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(outcome.status, CommandStatus::UserError);
    }

    #[test]
    fn changes_are_reported_per_package() {
        let (_dir, snapshot) = project("[\"demo>=1\", \"pytz\"]");
        lock_with(&snapshot, &old_repo(), &facts(), &CancelToken::new()).unwrap();
        let outcome = update_with(&snapshot, &[], &new_repo(), &facts(), &CancelToken::new())
            .unwrap();
        let changed = outcome.details["changed"].as_array().unwrap();
        assert_eq!(changed.len(), 2);
        assert!(changed
            .iter()
            .any(|entry| entry["name"] == "demo" && entry["to"] == "2.0.0"));
    }
}
