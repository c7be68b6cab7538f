mod config;
mod list;
mod lock;
mod mutate;
mod python;
mod sync;
mod update;

pub use config::{config_command, ConfigAction};
pub use list::project_list;
pub use lock::project_lock;
pub use mutate::{project_add, project_remove, AddRequest, RemoveRequest};
pub use python::{python_use, UseRequest};
pub use sync::{project_sync, SyncRequest};
pub use update::{project_update, UpdateRequest};

use serde_json::json;

use pyrite_domain::{
    resolve, CancelToken, CandidateRepository, EnvironmentFacts, Lockfile, Requirement,
    ResolveError, ResolveOptions,
};

use crate::outcome::ExecutionOutcome;

/// Resolves `roots` and freezes the result. The content hash always
/// covers `hash_requirements` (the project's declared set), which may be
/// a subset of the roots when extra pins are in play.
pub(crate) fn resolve_lockfile(
    roots: &[Requirement],
    hash_requirements: &[Requirement],
    repository: &dyn CandidateRepository,
    facts: &EnvironmentFacts,
    requires_python: &str,
    cancel: &CancelToken,
) -> Result<Lockfile, ResolveError> {
    let options = ResolveOptions {
        cancel: cancel.clone(),
    };
    let graph = resolve(roots, repository, facts, &options)?;
    Ok(Lockfile::from_graph(&graph, hash_requirements, requires_python))
}

/// Maps a failed resolve onto the outcome contract: conflicts are user
/// errors with the full chain, repository faults and cancellation are
/// failures.
pub(crate) fn resolve_failure_outcome(err: &ResolveError) -> ExecutionOutcome {
    match err {
        ResolveError::Resolution(error) => ExecutionOutcome::user_error(
            error.to_string().trim_end().to_string(),
            json!({
                "kind": "resolution-conflict",
                "package": error.package,
                "conflicts": error
                    .links
                    .iter()
                    .map(|link| json!({
                        "requirement": link.requirement,
                        "via": link.via(),
                    }))
                    .collect::<Vec<_>>(),
            }),
        ),
        ResolveError::Repository(error) => ExecutionOutcome::failure(
            error.to_string(),
            json!({ "kind": "repository-error", "package": error.package }),
        ),
        ResolveError::Cancelled => ExecutionOutcome::failure(
            "resolution cancelled",
            json!({ "kind": "cancelled" }),
        ),
    }
}

pub(crate) fn parse_failure_outcome(err: &pyrite_domain::ParseError) -> ExecutionOutcome {
    ExecutionOutcome::user_error(err.to_string(), json!({ "kind": "parse-error" }))
}

pub(crate) fn no_project_outcome(err: &anyhow::Error) -> ExecutionOutcome {
    ExecutionOutcome::user_error(
        err.to_string(),
        json!({ "hint": "run this inside a directory containing pyproject.toml" }),
    )
}
