#![deny(clippy::all, warnings)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod cancel;
pub mod lockfile;
pub mod project;
pub mod repository;
pub mod requirement;
pub mod resolver;

pub use cancel::CancelToken;
pub use lockfile::{
    content_hash, load_lockfile, parse_lockfile, render_lockfile, target_packages, validate,
    validate_lock_closure, write_lockfile, ClosureBreak, ClosureViolation, LockedArtifact,
    LockedPackage, Lockfile, LockfileError, LOCK_VERSION,
};
pub use project::{
    current_project_root, discover_project_root, ManifestAddReport, ManifestEditor,
    ManifestRemoveReport, ProjectSnapshot,
};
pub use repository::{
    Artifact, Candidate, CandidateRepository, CandidateSource, DependencyMetadata,
    EnvironmentFacts, ReleaseSpec, RepositoryError, StaticRepository,
};
pub use requirement::{marker_applies, normalize_name, DirectSource, ParseError, Requirement};
pub use resolver::{
    resolve, ConflictLink, ResolutionError, ResolutionGraph, ResolveError, ResolveOptions,
    ResolvedPackage,
};
