use serde::Serialize;

use crate::repository::CandidateSource;
use crate::requirement::Requirement;
use crate::resolver::ResolutionGraph;

use super::hash::content_hash;

pub const LOCK_VERSION: i64 = 1;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LockedArtifact {
    pub filename: String,
    pub url: String,
    pub sha256: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LockedPackage {
    /// Normalized package name.
    pub name: String,
    pub version: String,
    /// Direct source reference; `None` for registry candidates.
    pub source: Option<String>,
    /// Conditional predicate under which this entry applies.
    pub marker: Option<String>,
    /// Canonical requirement strings of the entry's dependencies.
    pub requires: Vec<String>,
    pub artifact: Option<LockedArtifact>,
}

impl LockedPackage {
    /// Artifact content hashes backing this entry.
    #[must_use]
    pub fn hashes(&self) -> Vec<&str> {
        self.artifact
            .iter()
            .map(|artifact| artifact.sha256.as_str())
            .collect()
    }
}

/// Persisted, hash-verified record of a resolved dependency graph.
/// Read-only to the synchronizer; only a successful resolution writes one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Lockfile {
    pub version: i64,
    /// Stable hash over the sorted canonical strings of the input
    /// requirements; mismatch with a current requirement set means stale.
    pub content_hash: String,
    /// Interpreter-version range the lock is valid under.
    pub requires_python: String,
    /// Entries sorted by name.
    pub packages: Vec<LockedPackage>,
}

impl Lockfile {
    /// Builds a lockfile from a finished resolution.
    #[must_use]
    pub fn from_graph(
        graph: &ResolutionGraph,
        input_requirements: &[Requirement],
        requires_python: &str,
    ) -> Self {
        let packages = graph
            .packages()
            .map(|package| LockedPackage {
                name: package.candidate.normalized.clone(),
                version: package.candidate.version.to_string(),
                source: match &package.candidate.source {
                    CandidateSource::Registry => None,
                    CandidateSource::Direct(source) => Some(source.reference()),
                },
                marker: package.marker.clone(),
                requires: package
                    .requires
                    .iter()
                    .map(|requirement| requirement.canonical().to_string())
                    .collect(),
                artifact: package.candidate.artifact.as_ref().map(|artifact| {
                    LockedArtifact {
                        filename: artifact.filename.clone(),
                        url: artifact.url.clone(),
                        sha256: artifact.sha256.clone(),
                    }
                }),
            })
            .collect();
        Self {
            version: LOCK_VERSION,
            content_hash: content_hash(input_requirements),
            requires_python: requires_python.to_string(),
            packages,
        }
    }

    #[must_use]
    pub fn package(&self, normalized: &str) -> Option<&LockedPackage> {
        self.packages
            .iter()
            .find(|package| package.name == normalized)
    }
}
