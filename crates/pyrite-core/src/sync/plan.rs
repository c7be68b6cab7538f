use std::collections::BTreeMap;

use pyrite_domain::{target_packages, EnvironmentFacts, LockedPackage, Lockfile};

use super::scan::InstalledRecord;

/// An installed package whose version differs from the locked one.
#[derive(Clone, Debug)]
pub struct PlannedUpdate {
    pub installed: InstalledRecord,
    pub target: LockedPackage,
}

/// The minimal operation set reconciling observed state with the lock.
#[derive(Clone, Debug, Default)]
pub struct SyncPlan {
    pub install: Vec<LockedPackage>,
    pub update: Vec<PlannedUpdate>,
    pub remove: Vec<InstalledRecord>,
}

impl SyncPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.install.is_empty() && self.update.is_empty() && self.remove.is_empty()
    }

    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.install.len() + self.update.len() + self.remove.len()
    }
}

/// Diffs installed records against the lock's target set. Lock entries
/// whose marker is false for `env` are not targets; installed packages
/// outside the target set are removed only under `clean`.
#[must_use]
pub fn build_plan(
    lock: &Lockfile,
    installed: &[InstalledRecord],
    env: &EnvironmentFacts,
    clean: bool,
) -> SyncPlan {
    let targets: BTreeMap<&str, &LockedPackage> = target_packages(lock, env)
        .into_iter()
        .map(|package| (package.name.as_str(), package))
        .collect();
    let installed_by_name: BTreeMap<&str, &InstalledRecord> = installed
        .iter()
        .map(|record| (record.name.as_str(), record))
        .collect();

    let mut plan = SyncPlan::default();
    for (name, target) in &targets {
        match installed_by_name.get(name) {
            None => plan.install.push((*target).clone()),
            Some(record) if record.version != target.version => plan.update.push(PlannedUpdate {
                installed: (*record).clone(),
                target: (*target).clone(),
            }),
            Some(_) => {}
        }
    }
    if clean {
        for (name, record) in &installed_by_name {
            if !targets.contains_key(name) {
                plan.remove.push((*record).clone());
            }
        }
    }
    plan
}
