mod conflict;
mod search;

use std::collections::BTreeMap;

use crate::repository::{Candidate, RepositoryError};
use crate::requirement::Requirement;

pub use conflict::{ConflictLink, ResolutionError};
pub use search::{resolve, ResolveOptions};

/// Why a resolve run did not produce a graph.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error("resolution cancelled")]
    Cancelled,
}

/// One entry of a finished resolution: the chosen candidate plus the
/// provenance and dependency facts the lockfile and synchronizer need.
#[derive(Clone, Debug)]
pub struct ResolvedPackage {
    pub candidate: Candidate,
    /// Dependencies applicable under the resolve environment, including
    /// activated extras buckets. Sorted by name, deduplicated.
    pub requires: Vec<Requirement>,
    /// Labels of everything that requested this package: `<root>` or
    /// `name==version`. Sorted, deduplicated.
    pub requested_by: Vec<String>,
    /// Chain from a root to this package, outermost first.
    pub root_chain: Vec<String>,
    /// Extras activated on the chosen candidate, sorted.
    pub extras: Vec<String>,
    /// Combined conditional predicate; `None` when any requester applies
    /// unconditionally.
    pub marker: Option<String>,
}

/// Exactly one chosen candidate per referenced package name.
#[derive(Clone, Debug, Default)]
pub struct ResolutionGraph {
    packages: BTreeMap<String, ResolvedPackage>,
}

impl ResolutionGraph {
    pub(crate) fn from_packages(packages: BTreeMap<String, ResolvedPackage>) -> Self {
        Self { packages }
    }

    #[must_use]
    pub fn get(&self, normalized: &str) -> Option<&ResolvedPackage> {
        self.packages.get(normalized)
    }

    /// Entries in name order.
    pub fn packages(&self) -> impl Iterator<Item = &ResolvedPackage> {
        self.packages.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}
