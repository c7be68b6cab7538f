use std::collections::BTreeMap;
use std::str::FromStr;

use pep440_rs::{Version, VersionSpecifiers};
use pep508_rs::MarkerEnvironment;

use crate::requirement::{normalize_name, DirectSource, Requirement};

/// Interpreter facts a repository and resolver need: the concrete version
/// (for `requires-python` filtering) and the marker environment (for
/// conditional predicates).
#[derive(Clone, Debug)]
pub struct EnvironmentFacts {
    pub python_version: Version,
    pub markers: MarkerEnvironment,
}

impl EnvironmentFacts {
    #[must_use]
    pub fn new(python_version: Version, markers: MarkerEnvironment) -> Self {
        Self {
            python_version,
            markers,
        }
    }

    /// A CPython-on-Linux environment for the given full version, used by
    /// unit tests across the workspace.
    ///
    /// # Panics
    /// Panics when `python_full_version` is not a valid PEP 440 version.
    #[must_use]
    pub fn testing(python_full_version: &str) -> Self {
        use pep508_rs::StringVersion;

        let version = Version::from_str(python_full_version).expect("valid python version");
        let short = {
            let mut parts = python_full_version.splitn(3, '.');
            let major = parts.next().unwrap_or("3");
            let minor = parts.next().unwrap_or("0");
            format!("{major}.{minor}")
        };
        let markers = MarkerEnvironment {
            implementation_name: "cpython".to_string(),
            implementation_version: StringVersion::from_str(python_full_version)
                .expect("valid implementation version"),
            os_name: "posix".to_string(),
            platform_machine: "x86_64".to_string(),
            platform_python_implementation: "CPython".to_string(),
            platform_release: "6.0".to_string(),
            platform_system: "Linux".to_string(),
            platform_version: "6.0".to_string(),
            python_full_version: StringVersion::from_str(python_full_version)
                .expect("valid python_full_version"),
            python_version: StringVersion::from_str(&short).expect("valid python_version"),
            sys_platform: "linux".to_string(),
        };
        Self::new(version, markers)
    }
}

/// Where a candidate's installable artifact comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CandidateSource {
    Registry,
    Direct(DirectSource),
}

/// One downloadable artifact backing a candidate.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Artifact {
    pub filename: String,
    pub url: String,
    pub sha256: String,
}

/// One concrete installable version of a package.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub name: String,
    pub normalized: String,
    pub version: Version,
    pub source: CandidateSource,
    pub requires_python: Option<String>,
    pub artifact: Option<Artifact>,
}

impl Candidate {
    #[must_use]
    pub fn registry(name: &str, version: Version) -> Self {
        Self {
            name: name.to_string(),
            normalized: normalize_name(name),
            version,
            source: CandidateSource::Registry,
            requires_python: None,
            artifact: None,
        }
    }

    /// Stable identity used for per-session metadata caching.
    #[must_use]
    pub fn identity(&self) -> String {
        format!("{}=={}", self.normalized, self.version)
    }

    /// True when this candidate may run under the environment interpreter.
    #[must_use]
    pub fn python_compatible(&self, env: &EnvironmentFacts) -> bool {
        match self.requires_python.as_deref() {
            Some(range) => match VersionSpecifiers::from_str(range) {
                Ok(specifiers) => specifiers.contains(&env.python_version),
                // An unparseable floor declaration excludes nothing.
                Err(_) => true,
            },
            None => true,
        }
    }

    /// True when this candidate satisfies `requirement`'s version constraint
    /// or, for a direct reference, points at the same artifact.
    #[must_use]
    pub fn satisfies(&self, requirement: &Requirement) -> bool {
        if let Some(source) = requirement.source() {
            return self.source == CandidateSource::Direct(source.clone());
        }
        requirement.accepts(&self.version)
    }
}

/// The dependencies one candidate declares: an unconditional set plus
/// per-extra buckets activated by the extras of the requesting requirement.
#[derive(Clone, Debug, Default)]
pub struct DependencyMetadata {
    pub requires: Vec<Requirement>,
    pub extra_requires: BTreeMap<String, Vec<Requirement>>,
}

/// Transient lookup/network fault, distinct from "no candidates found"
/// (which is a normal resolver signal carried by an empty candidate list).
#[derive(Debug, thiserror::Error)]
#[error("repository lookup failed for `{package}`: {reason}")]
pub struct RepositoryError {
    pub package: String,
    pub reason: String,
}

impl RepositoryError {
    #[must_use]
    pub fn new(package: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            reason: reason.into(),
        }
    }
}

/// The uniform candidate contract every backend implements identically, so
/// the resolver never branches on backend identity.
pub trait CandidateRepository {
    /// Candidates for `requirement`, newest first, pre-filtered to those
    /// whose `requires-python` range admits the environment interpreter.
    /// A direct-reference requirement yields exactly the referenced
    /// candidate.
    ///
    /// # Errors
    /// Returns [`RepositoryError`] on lookup/transport faults only; an
    /// empty result is not an error.
    fn find_candidates(
        &self,
        requirement: &Requirement,
        env: &EnvironmentFacts,
    ) -> Result<Vec<Candidate>, RepositoryError>;

    /// Declared dependencies of `candidate`; may fetch remote metadata,
    /// cached by candidate identity for the rest of the session.
    ///
    /// # Errors
    /// Returns [`RepositoryError`] when metadata cannot be obtained.
    fn dependencies(&self, candidate: &Candidate) -> Result<DependencyMetadata, RepositoryError>;

    /// Hint that metadata for `names` will be needed soon. Backends may
    /// warm caches concurrently; results are only ever consumed from the
    /// sequential decision loop.
    fn prefetch(&self, names: &[String]) {
        let _ = names;
    }
}

/// In-memory backend with declared candidate ordering. Used by unit tests
/// and as the offline seam; candidates are served newest-first.
#[derive(Debug, Default)]
pub struct StaticRepository {
    packages: BTreeMap<String, Vec<StaticRelease>>,
    direct: BTreeMap<String, StaticRelease>,
}

#[derive(Debug)]
struct StaticRelease {
    candidate: Candidate,
    metadata: DependencyMetadata,
}

impl StaticRepository {
    /// Registers a release; versions for one name are kept newest-first.
    ///
    /// # Panics
    /// Panics when `version` or any dependency string is malformed; static
    /// fixtures are authored by hand and fail loudly.
    pub fn add(&mut self, release: ReleaseSpec) {
        let ReleaseSpec {
            name,
            version,
            requires,
            extra_requires,
            requires_python,
            direct_url,
            sha256,
        } = release;
        let normalized = normalize_name(&name);
        let version = Version::from_str(&version).expect("valid release version");
        let source = match &direct_url {
            Some(url) => CandidateSource::Direct(direct_source_for(url)),
            None => CandidateSource::Registry,
        };
        let artifact = Some(Artifact {
            filename: format!("{normalized}-{version}-py3-none-any.whl"),
            url: direct_url.clone().unwrap_or_else(|| {
                format!("https://files.invalid/{normalized}/{normalized}-{version}-py3-none-any.whl")
            }),
            sha256,
        });
        let candidate = Candidate {
            name,
            normalized: normalized.clone(),
            version,
            source,
            requires_python,
            artifact,
        };
        let metadata = DependencyMetadata {
            requires: parse_all(&requires),
            extra_requires: extra_requires
                .into_iter()
                .map(|(extra, reqs)| (extra, parse_all(&reqs)))
                .collect(),
        };
        let release = StaticRelease {
            candidate,
            metadata,
        };
        match direct_url {
            Some(url) => {
                self.direct.insert(url, release);
            }
            None => {
                let releases = self.packages.entry(normalized).or_default();
                releases.push(release);
                releases.sort_by(|a, b| b.candidate.version.cmp(&a.candidate.version));
            }
        }
    }
}

fn parse_all(specs: &[String]) -> Vec<Requirement> {
    specs
        .iter()
        .map(|spec| Requirement::parse(spec).expect("valid static dependency"))
        .collect()
}

fn direct_source_for(url: &str) -> DirectSource {
    match url.strip_prefix("file://") {
        Some(path) => DirectSource::Path(path.to_string()),
        None => DirectSource::Url(url.to_string()),
    }
}

impl CandidateRepository for StaticRepository {
    fn find_candidates(
        &self,
        requirement: &Requirement,
        env: &EnvironmentFacts,
    ) -> Result<Vec<Candidate>, RepositoryError> {
        if let Some(source) = requirement.source() {
            let release = self.direct.get(&source.reference()).ok_or_else(|| {
                RepositoryError::new(
                    requirement.normalized(),
                    format!("unknown direct reference {}", source.reference()),
                )
            })?;
            return Ok(vec![release.candidate.clone()]);
        }
        let releases = match self.packages.get(requirement.normalized()) {
            Some(releases) => releases,
            None => return Ok(Vec::new()),
        };
        Ok(releases
            .iter()
            .map(|release| release.candidate.clone())
            .filter(|candidate| candidate.python_compatible(env))
            .collect())
    }

    fn dependencies(&self, candidate: &Candidate) -> Result<DependencyMetadata, RepositoryError> {
        if let CandidateSource::Direct(source) = &candidate.source {
            let release = self.direct.get(&source.reference()).ok_or_else(|| {
                RepositoryError::new(&candidate.normalized, "unknown direct reference")
            })?;
            return Ok(release.metadata.clone());
        }
        self.packages
            .get(&candidate.normalized)
            .and_then(|releases| {
                releases
                    .iter()
                    .find(|release| release.candidate.version == candidate.version)
            })
            .map(|release| release.metadata.clone())
            .ok_or_else(|| RepositoryError::new(&candidate.normalized, "unknown candidate"))
    }
}

/// Builder for one static release; keeps test fixtures readable.
#[derive(Debug)]
pub struct ReleaseSpec {
    name: String,
    version: String,
    requires: Vec<String>,
    extra_requires: BTreeMap<String, Vec<String>>,
    requires_python: Option<String>,
    direct_url: Option<String>,
    sha256: String,
}

impl ReleaseSpec {
    #[must_use]
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            requires: Vec::new(),
            extra_requires: BTreeMap::new(),
            requires_python: None,
            direct_url: None,
            sha256: format!("{name}-{version}-digest"),
        }
    }

    #[must_use]
    pub fn requires(mut self, specs: &[&str]) -> Self {
        self.requires = specs.iter().map(ToString::to_string).collect();
        self
    }

    #[must_use]
    pub fn extra(mut self, extra: &str, specs: &[&str]) -> Self {
        self.extra_requires.insert(
            extra.to_string(),
            specs.iter().map(ToString::to_string).collect(),
        );
        self
    }

    #[must_use]
    pub fn requires_python(mut self, range: &str) -> Self {
        self.requires_python = Some(range.to_string());
        self
    }

    #[must_use]
    pub fn direct_url(mut self, url: &str) -> Self {
        self.direct_url = Some(url.to_string());
        self
    }

    #[must_use]
    pub fn sha256(mut self, digest: &str) -> Self {
        self.sha256 = digest.to_string();
        self
    }
}
