use std::fs;

use anyhow::{Context, Result};
use fs4::FileExt;
use serde_json::json;
use tracing::info;

use pyrite_domain::{
    load_lockfile, validate, write_lockfile, CancelToken, CandidateRepository, Lockfile,
    LockfileError, ProjectSnapshot,
};

use crate::context::CommandContext;
use crate::outcome::ExecutionOutcome;
use crate::python::Environment;
use crate::sync::{
    build_plan, execute_plan, scan_installed, Installer, SyncOptions, SyncReport, WheelInstaller,
};

use super::{no_project_outcome, parse_failure_outcome, resolve_failure_outcome, resolve_lockfile};

#[derive(Clone, Debug)]
pub struct SyncRequest {
    pub clean: bool,
    pub dry_run: bool,
    pub workers: usize,
}

impl Default for SyncRequest {
    fn default() -> Self {
        Self {
            clean: false,
            dry_run: false,
            workers: 4,
        }
    }
}

/// Reconciles the environment with the lock. A missing or stale lock is
/// re-resolved first (reporting why), then the minimal plan is applied.
///
/// # Errors
/// Returns an error only on unexpected faults; expected failures are
/// reported through the outcome status.
pub fn project_sync(ctx: &CommandContext, request: &SyncRequest) -> Result<ExecutionOutcome> {
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
    let installer = match WheelInstaller::new() {
        Ok(installer) => installer,
        Err(err) => {
            return Ok(ExecutionOutcome::failure(
                format!("{err:#}"),
                json!({ "kind": "installer-error" }),
            ))
        }
    };
    sync_with(
        &snapshot,
        &environment,
        &repository,
        &installer,
        request,
        &ctx.cancel_token(),
    )
}

pub(crate) fn sync_with(
    snapshot: &ProjectSnapshot,
    environment: &Environment,
    repository: &dyn CandidateRepository,
    installer: &dyn Installer,
    request: &SyncRequest,
    cancel: &CancelToken,
) -> Result<ExecutionOutcome> {
    let requirements = match snapshot.requirements() {
        Ok(requirements) => requirements,
        Err(err) => return Ok(parse_failure_outcome(&err)),
    };
    let facts = environment.facts();

    let mut relock_note: Option<&str> = None;
    let lock: Lockfile = match load_lockfile(&snapshot.lock_path) {
        Ok(lock) if validate(&requirements, &lock) => lock,
        Ok(_) => {
            info!("lock file hash mismatch, re-resolving");
            relock_note = Some("lock file hash mismatch; lockfile regenerated");
            match resolve_lockfile(
                &requirements,
                &requirements,
                repository,
                &facts,
                &snapshot.python_requirement,
                cancel,
            ) {
                Ok(lock) => {
                    write_lockfile(&snapshot.lock_path, &lock)?;
                    lock
                }
                Err(err) => return Ok(resolve_failure_outcome(&err)),
            }
        }
        Err(LockfileError::Missing(_)) => {
            relock_note = Some("no lockfile found; resolved from manifest");
            match resolve_lockfile(
                &requirements,
                &requirements,
                repository,
                &facts,
                &snapshot.python_requirement,
                cancel,
            ) {
                Ok(lock) => {
                    write_lockfile(&snapshot.lock_path, &lock)?;
                    lock
                }
                Err(err) => return Ok(resolve_failure_outcome(&err)),
            }
        }
        Err(err) => {
            return Ok(ExecutionOutcome::failure(
                err.to_string(),
                json!({ "kind": "lockfile-error" }),
            ))
        }
    };

    if let Err(err) = environment.ensure_packages_dir() {
        return Ok(ExecutionOutcome::failure(
            err.to_string(),
            json!({ "kind": "environment-error" }),
        ));
    }
    // Concurrent syncs of one environment are serialized externally; the
    // advisory lock is held until this invocation finishes.
    let _guard = acquire_sync_lock(environment)?;

    let installed = scan_installed(&environment.packages_dir)?;
    let plan = build_plan(&lock, &installed, &facts, request.clean);

    if request.dry_run {
        return Ok(ExecutionOutcome::success(
            format!(
                "would perform {} operation(s) (dry-run)",
                plan.operation_count()
            ),
            json!({
                "dry_run": true,
                "install": plan.install.iter().map(|p| p.name.clone()).collect::<Vec<_>>(),
                "update": plan.update.iter().map(|u| u.target.name.clone()).collect::<Vec<_>>(),
                "remove": plan.remove.iter().map(|r| r.name.clone()).collect::<Vec<_>>(),
                "note": relock_note,
            }),
        ));
    }

    if plan.is_empty() {
        return Ok(ExecutionOutcome::success(
            "environment already in sync",
            json!({ "operations": 0, "note": relock_note }),
        ));
    }

    let report = execute_plan(
        plan,
        &lock,
        environment,
        installer,
        &SyncOptions {
            workers: request.workers,
            cancel: cancel.clone(),
        },
    );
    Ok(report_outcome(&report, relock_note))
}

fn report_outcome(report: &SyncReport, note: Option<&str>) -> ExecutionOutcome {
    let mut details = serde_json::to_value(report).unwrap_or_default();
    if let (Some(map), Some(note)) = (details.as_object_mut(), note) {
        map.insert("note".to_string(), json!(note));
    }
    if report.cancelled {
        return ExecutionOutcome::failure("sync cancelled", details);
    }
    if report.failed.is_empty() {
        ExecutionOutcome::success(
            format!("synced {} package(s)", report.operation_count()),
            details,
        )
    } else {
        ExecutionOutcome::failure(
            format!("{} sync operation(s) failed", report.failed.len()),
            details,
        )
    }
}

fn acquire_sync_lock(environment: &Environment) -> Result<fs::File> {
    let dir = environment
        .packages_dir
        .parent()
        .unwrap_or(&environment.packages_dir);
    fs::create_dir_all(dir)?;
    let path = dir.join(".pyrite-sync.lock");
    let file = fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .with_context(|| format!("failed to open sync lock {}", path.display()))?;
    file.lock_exclusive()
        .with_context(|| format!("failed to acquire sync lock {}", path.display()))?;
    Ok(file)
}
