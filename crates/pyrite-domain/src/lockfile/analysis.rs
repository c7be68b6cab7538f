use std::collections::BTreeMap;

use crate::repository::EnvironmentFacts;
use crate::requirement::{marker_applies, Requirement};

use super::types::{LockedPackage, Lockfile};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClosureBreak {
    MissingDependency,
    VersionMismatch { locked: String },
    MalformedRequirement,
}

/// One hole in the lock's closure invariant.
#[derive(Clone, Debug)]
pub struct ClosureViolation {
    pub package: String,
    pub requirement: String,
    pub reason: ClosureBreak,
}

/// Checks that every declared dependency of every locked entry is itself
/// locked at a satisfying version. Dependencies whose marker is false for
/// `env` are exempt; an empty result means the closure holds.
#[must_use]
pub fn validate_lock_closure(lock: &Lockfile, env: &EnvironmentFacts) -> Vec<ClosureViolation> {
    let by_name: BTreeMap<&str, &LockedPackage> = lock
        .packages
        .iter()
        .map(|package| (package.name.as_str(), package))
        .collect();

    let mut violations = Vec::new();
    for package in &lock.packages {
        for spec in &package.requires {
            let requirement = match Requirement::parse(spec) {
                Ok(requirement) => requirement,
                Err(_) => {
                    violations.push(ClosureViolation {
                        package: package.name.clone(),
                        requirement: spec.clone(),
                        reason: ClosureBreak::MalformedRequirement,
                    });
                    continue;
                }
            };
            if !requirement.applies(&env.markers) {
                continue;
            }
            let Some(dependency) = by_name.get(requirement.normalized()) else {
                violations.push(ClosureViolation {
                    package: package.name.clone(),
                    requirement: spec.clone(),
                    reason: ClosureBreak::MissingDependency,
                });
                continue;
            };
            let satisfied = dependency
                .version
                .parse()
                .map(|version| requirement.accepts(&version))
                .unwrap_or(false);
            if !satisfied && requirement.source().is_none() {
                violations.push(ClosureViolation {
                    package: package.name.clone(),
                    requirement: spec.clone(),
                    reason: ClosureBreak::VersionMismatch {
                        locked: dependency.version.clone(),
                    },
                });
            }
        }
    }
    violations
}

/// The lock entries that apply under `env`: everything whose conditional
/// predicate (if any) evaluates true. This is the synchronizer's target
/// set.
#[must_use]
pub fn target_packages<'a>(lock: &'a Lockfile, env: &EnvironmentFacts) -> Vec<&'a LockedPackage> {
    lock.packages
        .iter()
        .filter(|package| match package.marker.as_deref() {
            Some(marker) => marker_applies(marker, &env.markers).unwrap_or(true),
            None => true,
        })
        .collect()
}
