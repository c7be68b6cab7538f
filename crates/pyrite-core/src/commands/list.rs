use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use serde_json::json;

use pyrite_domain::{load_lockfile, normalize_name, LockfileError, Requirement};

use crate::context::CommandContext;
use crate::outcome::ExecutionOutcome;

use super::no_project_outcome;

/// Shows the locked resolution graph: every entry with its version,
/// source, predicate, and what requires it.
///
/// # Errors
/// Returns an error only on unexpected faults; expected failures are
/// reported through the outcome status.
pub fn project_list(ctx: &CommandContext) -> Result<ExecutionOutcome> {
    let snapshot = match ctx.snapshot() {
        Ok(snapshot) => snapshot,
        Err(err) => return Ok(no_project_outcome(&err)),
    };
    Ok(list_at(&snapshot.lock_path))
}

pub(crate) fn list_at(lock_path: &Path) -> ExecutionOutcome {
    let lock = match load_lockfile(lock_path) {
        Ok(lock) => lock,
        Err(LockfileError::Missing(_)) => {
            return ExecutionOutcome::user_error(
                "no lockfile found",
                json!({ "hint": "run `pyrite lock` first" }),
            )
        }
        Err(err) => {
            return ExecutionOutcome::failure(err.to_string(), json!({ "kind": "lockfile-error" }))
        }
    };

    // Invert the requires edges so each row names its dependents.
    let mut required_by: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for package in &lock.packages {
        for spec in &package.requires {
            let Ok(requirement) = Requirement::parse(spec) else {
                continue;
            };
            required_by
                .entry(normalize_name(requirement.normalized()))
                .or_default()
                .push(package.name.clone());
        }
    }

    let rows: Vec<serde_json::Value> = lock
        .packages
        .iter()
        .map(|package| {
            let mut dependents = required_by.get(&package.name).cloned().unwrap_or_default();
            dependents.sort();
            dependents.dedup();
            json!({
                "name": package.name,
                "version": package.version,
                "source": package.source,
                "marker": package.marker,
                "required_by": dependents,
            })
        })
        .collect();

    ExecutionOutcome::success(
        format!("{} package(s) locked", rows.len()),
        json!({
            "packages": rows,
            "content_hash": lock.content_hash,
            "requires_python": lock.requires_python,
        }),
    )
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::commands::lock::lock_with;
    use crate::outcome::CommandStatus;
    use pyrite_domain::{
        CancelToken, EnvironmentFacts, ProjectSnapshot, ReleaseSpec, StaticRepository,
    };

    #[test]
    fn list_shows_entries_with_dependents() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("pyproject.toml"),
            "[project]\nname = \"demo-app\"\ndependencies = [\"demo>=1\"]\n",
        )
        .unwrap();
        let snapshot = ProjectSnapshot::read_from(dir.path()).unwrap();
        let mut repo = StaticRepository::default();
        repo.add(ReleaseSpec::new("demo", "1.0.0").requires(&["idna>=2"]));
        repo.add(ReleaseSpec::new("idna", "3.6"));
        lock_with(
            &snapshot,
            &repo,
            &EnvironmentFacts::testing("3.11.4"),
            &CancelToken::new(),
        )
        .unwrap();

        let outcome = list_at(&snapshot.lock_path);
        assert_eq!(outcome.status, CommandStatus::Ok);
        let rows = outcome.details["packages"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        let idna = rows
            .iter()
            .find(|row| row["name"] == "idna")
            .expect("idna row");
        assert_eq!(idna["required_by"], json!(["demo"]));
    }

    #[test]
    fn missing_lockfile_is_a_user_error_with_a_hint() {
        let dir = tempdir().unwrap();
        let outcome = list_at(&dir.path().join("pyrite.lock"));
        assert_eq!(outcome.status, CommandStatus::UserError);
        assert!(outcome.details["hint"]
            .as_str()
            .unwrap()
            .contains("pyrite lock"));
    }
}
