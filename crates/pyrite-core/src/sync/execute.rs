use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use pyrite_domain::{CancelToken, LockedPackage, Lockfile, Requirement};

use crate::python::Environment;

use super::install::Installer;
use super::plan::{PlannedUpdate, SyncPlan};

#[derive(Clone, Debug)]
pub struct SyncOptions {
    pub workers: usize,
    pub cancel: CancelToken,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            cancel: CancelToken::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperationKind {
    Install,
    Update,
    Remove,
}

/// One package operation that did not complete, with its cause.
#[derive(Clone, Debug, Serialize)]
pub struct SyncFailure {
    pub package: String,
    pub operation: SyncOperationKind,
    pub reason: String,
}

/// What actually happened, package by package. A record lands in
/// `installed`/`updated`/`removed` only when its operation completed.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SyncReport {
    pub installed: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    pub failed: Vec<SyncFailure>,
    pub cancelled: bool,
}

impl SyncReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }

    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.installed.len() + self.updated.len() + self.removed.len() + self.failed.len()
    }
}

enum PendingOp {
    Install(LockedPackage),
    Update(PlannedUpdate),
}

impl PendingOp {
    fn kind(&self) -> SyncOperationKind {
        match self {
            Self::Install(_) => SyncOperationKind::Install,
            Self::Update(_) => SyncOperationKind::Update,
        }
    }
}

/// Applies a sync plan. Installs and updates run in dependency waves: a
/// package's wave comes strictly after every wave containing one of its
/// locked dependencies, and independent operations inside a wave run on a
/// bounded worker pool. Removals run last, in name order. Per-package
/// failures are isolated; dependents of a failed package are skipped and
/// recorded, unrelated operations proceed.
pub fn execute_plan(
    plan: SyncPlan,
    lock: &Lockfile,
    env: &Environment,
    installer: &dyn Installer,
    options: &SyncOptions,
) -> SyncReport {
    let mut report = SyncReport::default();
    if plan.is_empty() {
        return report;
    }

    let mut ops: BTreeMap<String, PendingOp> = BTreeMap::new();
    for package in plan.install {
        ops.insert(package.name.clone(), PendingOp::Install(package));
    }
    for update in plan.update {
        ops.insert(update.target.name.clone(), PendingOp::Update(update));
    }

    let dependencies = locked_dependencies(lock, &ops);
    let waves = schedule_waves(&dependencies, &ops);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.workers.max(1))
        .build()
        .ok();

    let mut failed_names: BTreeSet<String> = BTreeSet::new();
    for wave in waves {
        if options.cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        let mut runnable: Vec<String> = Vec::new();
        for name in wave {
            let blocked: Vec<&str> = dependencies
                .get(&name)
                .map(|deps| {
                    deps.iter()
                        .filter(|dep| failed_names.contains(*dep))
                        .map(String::as_str)
                        .collect()
                })
                .unwrap_or_default();
            if blocked.is_empty() {
                runnable.push(name);
            } else {
                let kind = ops[&name].kind();
                report.failed.push(SyncFailure {
                    package: name.clone(),
                    operation: kind,
                    reason: format!("dependency {} failed", blocked.join(", ")),
                });
                failed_names.insert(name);
            }
        }

        let run_wave = || {
            runnable
                .par_iter()
                .map(|name| {
                    let op = &ops[name];
                    let result = match op {
                        PendingOp::Install(package) => installer.install(package, env),
                        PendingOp::Update(update) => installer
                            .remove(&update.installed, env)
                            .and_then(|()| installer.install(&update.target, env)),
                    };
                    (name.clone(), op.kind(), result.map_err(|err| format!("{err:#}")))
                })
                .collect::<Vec<_>>()
        };
        let mut results = match &pool {
            Some(pool) => pool.install(run_wave),
            None => run_wave(),
        };
        results.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, kind, result) in results {
            match result {
                Ok(()) => match kind {
                    SyncOperationKind::Install => report.installed.push(name),
                    SyncOperationKind::Update => report.updated.push(name),
                    SyncOperationKind::Remove => report.removed.push(name),
                },
                Err(reason) => {
                    warn!(package = %name, reason = %reason, "sync_operation_failed");
                    failed_names.insert(name.clone());
                    report.failed.push(SyncFailure {
                        package: name,
                        operation: kind,
                        reason,
                    });
                }
            }
        }
    }

    // Retained packages never depend on removal candidates (the lock is
    // closed over its own entries), so removal order is free; name order
    // keeps it reproducible.
    if !report.cancelled {
        let mut removals = plan.remove;
        removals.sort_by(|a, b| a.name.cmp(&b.name));
        for record in removals {
            if options.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            match installer.remove(&record, env) {
                Ok(()) => report.removed.push(record.name),
                Err(err) => {
                    warn!(package = %record.name, error = %err, "sync_remove_failed");
                    report.failed.push(SyncFailure {
                        package: record.name,
                        operation: SyncOperationKind::Remove,
                        reason: format!("{err:#}"),
                    });
                }
            }
        }
    }

    report.installed.sort();
    report.updated.sort();
    report.removed.sort();
    report.failed.sort_by(|a, b| a.package.cmp(&b.package));
    report
}

/// Dependency edges between pending operations, from the locked graph.
fn locked_dependencies(
    lock: &Lockfile,
    ops: &BTreeMap<String, PendingOp>,
) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for package in &lock.packages {
        if !ops.contains_key(&package.name) {
            continue;
        }
        let mut deps: Vec<String> = package
            .requires
            .iter()
            .filter_map(|spec| Requirement::parse(spec).ok())
            .map(|requirement| requirement.normalized().to_string())
            .filter(|dep| ops.contains_key(dep) && dep != &package.name)
            .collect();
        deps.sort();
        deps.dedup();
        map.insert(package.name.clone(), deps);
    }
    map
}

/// Layers operations so each wave only depends on earlier waves. A cyclic
/// locked graph degrades to one sequential wave in name order.
fn schedule_waves(
    dependencies: &BTreeMap<String, Vec<String>>,
    ops: &BTreeMap<String, PendingOp>,
) -> Vec<Vec<String>> {
    let mut graph: DiGraph<String, ()> = DiGraph::new();
    let mut indices: BTreeMap<&str, NodeIndex> = BTreeMap::new();
    for name in ops.keys() {
        indices.insert(name.as_str(), graph.add_node(name.clone()));
    }
    for (name, deps) in dependencies {
        for dep in deps {
            if let (Some(&from), Some(&to)) = (indices.get(dep.as_str()), indices.get(name.as_str()))
            {
                graph.add_edge(from, to, ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(order) => {
            let mut level: BTreeMap<NodeIndex, usize> = BTreeMap::new();
            let mut waves: Vec<Vec<String>> = Vec::new();
            for node in order {
                let depth = graph
                    .neighbors_directed(node, Direction::Incoming)
                    .map(|parent| level[&parent] + 1)
                    .max()
                    .unwrap_or(0);
                level.insert(node, depth);
                if waves.len() <= depth {
                    waves.resize_with(depth + 1, Vec::new);
                }
                waves[depth].push(graph[node].clone());
            }
            for wave in &mut waves {
                wave.sort();
            }
            debug!(waves = waves.len(), "sync_waves_scheduled");
            waves
        }
        Err(_) => {
            warn!("dependency cycle in locked graph; syncing sequentially");
            vec![ops.keys().cloned().collect()]
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Mutex;

    use anyhow::bail;
    use tempfile::tempdir;

    use super::*;
    use crate::python::Interpreter;
    use crate::sync::plan::build_plan;
    use crate::sync::scan::{scan_installed, InstalledRecord};
    use pyrite_domain::{EnvironmentFacts, LockedPackage, LOCK_VERSION};

    struct FakeInstaller {
        log: Mutex<Vec<String>>,
        fail: BTreeSet<String>,
    }

    impl FakeInstaller {
        fn new() -> Self {
            Self {
                log: Mutex::new(Vec::new()),
                fail: BTreeSet::new(),
            }
        }

        fn failing(names: &[&str]) -> Self {
            Self {
                log: Mutex::new(Vec::new()),
                fail: names.iter().map(ToString::to_string).collect(),
            }
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    impl Installer for FakeInstaller {
        fn install(&self, package: &LockedPackage, env: &Environment) -> anyhow::Result<()> {
            if self.fail.contains(&package.name) {
                bail!("simulated install failure");
            }
            fs::create_dir_all(
                env.packages_dir
                    .join(format!("{}-{}.dist-info", package.name, package.version)),
            )?;
            self.log
                .lock()
                .unwrap()
                .push(format!("install {}", package.name));
            Ok(())
        }

        fn remove(&self, record: &InstalledRecord, _env: &Environment) -> anyhow::Result<()> {
            if record.path.exists() {
                fs::remove_dir_all(&record.path)?;
            }
            self.log
                .lock()
                .unwrap()
                .push(format!("remove {}", record.name));
            Ok(())
        }
    }

    fn locked(name: &str, version: &str, requires: &[&str]) -> LockedPackage {
        LockedPackage {
            name: name.to_string(),
            version: version.to_string(),
            requires: requires.iter().map(ToString::to_string).collect(),
            ..LockedPackage::default()
        }
    }

    fn lock_with(packages: Vec<LockedPackage>) -> Lockfile {
        Lockfile {
            version: LOCK_VERSION,
            content_hash: "sha256:test".to_string(),
            requires_python: ">=3.9".to_string(),
            packages,
        }
    }

    fn test_env(root: &std::path::Path) -> Environment {
        let env = Environment::new(root, Interpreter::testing("3.11.4"));
        env.ensure_packages_dir().unwrap();
        env
    }

    fn plan_for(lock: &Lockfile, env: &Environment, clean: bool) -> SyncPlan {
        let installed = scan_installed(&env.packages_dir).unwrap();
        build_plan(lock, &installed, &EnvironmentFacts::testing("3.11.4"), clean)
    }

    #[test]
    fn dependencies_install_before_their_dependents() {
        let dir = tempdir().unwrap();
        let env = test_env(dir.path());
        let lock = lock_with(vec![
            locked("requests", "2.31.0", &["idna>=2", "urllib3>=1.26"]),
            locked("idna", "3.6", &[]),
            locked("urllib3", "2.1.0", &[]),
        ]);
        let installer = FakeInstaller::new();
        let report = execute_plan(
            plan_for(&lock, &env, false),
            &lock,
            &env,
            &installer,
            &SyncOptions::default(),
        );
        assert!(report.is_success());
        assert_eq!(report.installed, vec!["idna", "requests", "urllib3"]);

        let log = installer.log();
        let position = |entry: &str| log.iter().position(|line| line == entry).unwrap();
        assert!(position("install idna") < position("install requests"));
        assert!(position("install urllib3") < position("install requests"));
    }

    #[test]
    fn a_failed_dependency_skips_dependents_but_not_strangers() {
        let dir = tempdir().unwrap();
        let env = test_env(dir.path());
        let lock = lock_with(vec![
            locked("requests", "2.31.0", &["idna>=2"]),
            locked("idna", "3.6", &[]),
            locked("pytz", "2024.1", &[]),
        ]);
        let installer = FakeInstaller::failing(&["idna"]);
        let report = execute_plan(
            plan_for(&lock, &env, false),
            &lock,
            &env,
            &installer,
            &SyncOptions::default(),
        );
        assert!(!report.is_success());
        assert_eq!(report.installed, vec!["pytz"]);
        let failures: BTreeMap<&str, &str> = report
            .failed
            .iter()
            .map(|failure| (failure.package.as_str(), failure.reason.as_str()))
            .collect();
        assert!(failures["idna"].contains("simulated"));
        assert!(failures["requests"].contains("dependency idna failed"));
    }

    #[test]
    fn second_sync_is_a_no_op() {
        let dir = tempdir().unwrap();
        let env = test_env(dir.path());
        let lock = lock_with(vec![
            locked("demo", "1.0.0", &["idna>=2"]),
            locked("idna", "3.6", &[]),
        ]);
        let installer = FakeInstaller::new();
        let first = execute_plan(
            plan_for(&lock, &env, false),
            &lock,
            &env,
            &installer,
            &SyncOptions::default(),
        );
        assert_eq!(first.operation_count(), 2);

        let second_plan = plan_for(&lock, &env, true);
        assert!(second_plan.is_empty(), "resynced plan must be empty");
        let second = execute_plan(second_plan, &lock, &env, &installer, &SyncOptions::default());
        assert_eq!(second.operation_count(), 0);
    }

    #[test]
    fn updates_replace_and_removals_run_last() {
        let dir = tempdir().unwrap();
        let env = test_env(dir.path());
        fs::create_dir_all(env.packages_dir.join("demo-0.9.0.dist-info")).unwrap();
        fs::create_dir_all(env.packages_dir.join("stray-0.1.0.dist-info")).unwrap();

        let lock = lock_with(vec![locked("demo", "1.0.0", &[])]);
        let installer = FakeInstaller::new();
        let report = execute_plan(
            plan_for(&lock, &env, true),
            &lock,
            &env,
            &installer,
            &SyncOptions::default(),
        );
        assert!(report.is_success());
        assert_eq!(report.updated, vec!["demo"]);
        assert_eq!(report.removed, vec!["stray"]);

        let log = installer.log();
        assert_eq!(
            log,
            vec!["remove demo", "install demo", "remove stray"],
            "update replaces in place, removals run last"
        );
    }

    #[test]
    fn cancellation_stops_before_the_next_wave() {
        let dir = tempdir().unwrap();
        let env = test_env(dir.path());
        let lock = lock_with(vec![locked("demo", "1.0.0", &[])]);
        let options = SyncOptions::default();
        options.cancel.cancel();
        let installer = FakeInstaller::new();
        let report = execute_plan(plan_for(&lock, &env, false), &lock, &env, &installer, &options);
        assert!(report.cancelled);
        assert!(!report.is_success());
        assert_eq!(report.operation_count(), 0);
        assert!(installer.log().is_empty());
    }
}
