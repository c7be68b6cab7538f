use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pep440_rs::Version;
use rayon::prelude::*;
use rayon::ThreadPool;
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use pyrite_domain::{
    normalize_name, Artifact, Candidate, CandidateRepository, CandidateSource, DependencyMetadata,
    DirectSource, EnvironmentFacts, Requirement, RepositoryError,
};

const DEFAULT_INDEX: &str = "https://pypi.org/pypi";
const MAX_ATTEMPTS: u32 = 3;
const PREFETCH_WORKERS: usize = 4;

/// Candidate backend over a PyPI-compatible JSON index. Lookup results and
/// per-candidate dependency metadata are cached for the session; transient
/// transport faults are retried a bounded number of times with backoff.
pub struct PyPiRepository {
    client: Client,
    index: Url,
    online: bool,
    projects: Mutex<HashMap<String, Option<Arc<ProjectDocument>>>>,
    metadata: Mutex<HashMap<String, DependencyMetadata>>,
    pool: ThreadPool,
}

impl PyPiRepository {
    /// Builds a backend against `index_url` (default: pypi.org).
    ///
    /// # Errors
    /// Returns an error when the index URL is invalid or the HTTP client
    /// cannot be constructed.
    pub fn new(index_url: Option<&str>, online: bool) -> anyhow::Result<Self> {
        let index = Url::parse(index_url.unwrap_or(DEFAULT_INDEX))?;
        let client = Client::builder()
            .user_agent(format!("pyrite/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(PREFETCH_WORKERS)
            .build()?;
        Ok(Self {
            client,
            index,
            online,
            projects: Mutex::new(HashMap::new()),
            metadata: Mutex::new(HashMap::new()),
            pool,
        })
    }

    fn project_url(&self, normalized: &str) -> String {
        format!(
            "{}/{normalized}/json",
            self.index.as_str().trim_end_matches('/')
        )
    }

    fn release_url(&self, normalized: &str, version: &str) -> String {
        format!(
            "{}/{normalized}/{version}/json",
            self.index.as_str().trim_end_matches('/')
        )
    }

    fn project_document(
        &self,
        normalized: &str,
    ) -> Result<Option<Arc<ProjectDocument>>, RepositoryError> {
        if let Some(cached) = self
            .projects
            .lock()
            .expect("project cache lock")
            .get(normalized)
        {
            return Ok(cached.clone());
        }
        let fetched: Option<ProjectDocument> =
            self.fetch_json(normalized, &self.project_url(normalized))?;
        let document = fetched.map(Arc::new);
        self.projects
            .lock()
            .expect("project cache lock")
            .insert(normalized.to_string(), document.clone());
        Ok(document)
    }

    fn fetch_json<T>(&self, package: &str, url: &str) -> Result<Option<T>, RepositoryError>
    where
        T: serde::de::DeserializeOwned,
    {
        if !self.online {
            return Err(RepositoryError::new(
                package,
                "offline mode is enabled (PYRITE_OFFLINE)",
            ));
        }
        let mut delay = Duration::from_millis(250);
        let mut last = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            match self.client.get(url).send() {
                Ok(response) => {
                    if response.status() == reqwest::StatusCode::NOT_FOUND {
                        return Ok(None);
                    }
                    match response.error_for_status() {
                        Ok(response) => {
                            return match response.json::<T>() {
                                Ok(value) => Ok(Some(value)),
                                // A malformed payload will not improve on retry.
                                Err(err) => Err(RepositoryError::new(
                                    package,
                                    format!("invalid index payload: {err}"),
                                )),
                            };
                        }
                        Err(err) => last = err.to_string(),
                    }
                }
                Err(err) => last = err.to_string(),
            }
            if attempt < MAX_ATTEMPTS {
                warn!(package = %package, attempt, error = %last, "index_fetch_retry");
                std::thread::sleep(delay);
                delay *= 2;
            }
        }
        Err(RepositoryError::new(
            package,
            format!("index fetch failed after {MAX_ATTEMPTS} attempts: {last}"),
        ))
    }
}

impl CandidateRepository for PyPiRepository {
    fn find_candidates(
        &self,
        requirement: &Requirement,
        env: &EnvironmentFacts,
    ) -> Result<Vec<Candidate>, RepositoryError> {
        if let Some(source) = requirement.source() {
            return direct_candidate(requirement, source).map(|candidate| vec![candidate]);
        }
        let normalized = requirement.normalized();
        let Some(document) = self.project_document(normalized)? else {
            debug!(package = %normalized, "package_not_in_index");
            return Ok(Vec::new());
        };
        Ok(candidates_from_document(
            requirement.name(),
            &document,
            env,
        ))
    }

    fn dependencies(&self, candidate: &Candidate) -> Result<DependencyMetadata, RepositoryError> {
        let identity = candidate.identity();
        if let Some(cached) = self
            .metadata
            .lock()
            .expect("metadata cache lock")
            .get(&identity)
        {
            return Ok(cached.clone());
        }
        // A pinned reference has no index entry; its dependencies are
        // unknown until the artifact itself is inspected at install time.
        let metadata = if matches!(candidate.source, CandidateSource::Direct(_)) {
            DependencyMetadata::default()
        } else {
            let release: Option<ReleaseDocument> = self.fetch_json(
                &candidate.normalized,
                &self.release_url(&candidate.normalized, &candidate.version.to_string()),
            )?;
            match release {
                Some(release) => bucket_requires(
                    &release.info.requires_dist.unwrap_or_default(),
                    &candidate.normalized,
                ),
                None => DependencyMetadata::default(),
            }
        };
        self.metadata
            .lock()
            .expect("metadata cache lock")
            .insert(identity, metadata.clone());
        Ok(metadata)
    }

    fn prefetch(&self, names: &[String]) {
        let names: Vec<String> = names.to_vec();
        self.pool.install(|| {
            names.par_iter().for_each(|name| {
                // Failures resurface in the decision loop; warming is best
                // effort.
                let _ = self.project_document(name);
            });
        });
    }
}

#[derive(Debug, Deserialize)]
struct ProjectDocument {
    releases: BTreeMap<String, Vec<ReleaseFile>>,
}

#[derive(Debug, Deserialize)]
struct ReleaseFile {
    filename: String,
    packagetype: String,
    url: String,
    #[serde(default)]
    yanked: bool,
    #[serde(default)]
    requires_python: Option<String>,
    #[serde(default)]
    digests: Option<Digests>,
}

#[derive(Debug, Deserialize)]
struct Digests {
    #[serde(default)]
    sha256: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReleaseDocument {
    info: ReleaseInfo,
}

#[derive(Debug, Deserialize)]
struct ReleaseInfo {
    #[serde(default)]
    requires_dist: Option<Vec<String>>,
}

/// Newest-first candidates for one index document, pre-filtered to the
/// environment interpreter.
fn candidates_from_document(
    name: &str,
    document: &ProjectDocument,
    env: &EnvironmentFacts,
) -> Vec<Candidate> {
    let normalized = normalize_name(name);
    let mut candidates: Vec<Candidate> = Vec::new();
    for (version_text, files) in &document.releases {
        let Ok(version) = Version::from_str(version_text) else {
            continue;
        };
        let Some(file) = preferred_file(files) else {
            continue;
        };
        candidates.push(Candidate {
            name: name.to_string(),
            normalized: normalized.clone(),
            version,
            source: CandidateSource::Registry,
            requires_python: file.requires_python.clone(),
            artifact: Some(Artifact {
                filename: file.filename.clone(),
                url: file.url.clone(),
                sha256: file
                    .digests
                    .as_ref()
                    .and_then(|digests| digests.sha256.clone())
                    .unwrap_or_default(),
            }),
        });
    }
    candidates.sort_by(|a, b| b.version.cmp(&a.version));
    candidates
        .into_iter()
        .filter(|candidate| candidate.python_compatible(env))
        .collect()
}

/// A universal wheel beats any other wheel, which beats an sdist; yanked
/// files never count.
fn preferred_file(files: &[ReleaseFile]) -> Option<&ReleaseFile> {
    let live = || files.iter().filter(|file| !file.yanked);
    live()
        .find(|file| {
            file.packagetype == "bdist_wheel" && file.filename.ends_with("py3-none-any.whl")
        })
        .or_else(|| live().find(|file| file.packagetype == "bdist_wheel"))
        .or_else(|| live().find(|file| file.packagetype == "sdist"))
}

fn direct_candidate(
    requirement: &Requirement,
    source: &DirectSource,
) -> Result<Candidate, RepositoryError> {
    let reference = source.reference();
    let filename = reference
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();
    let version =
        version_from_filename(&filename, requirement.normalized()).ok_or_else(|| {
            RepositoryError::new(
                requirement.normalized(),
                format!("cannot determine version from `{filename}`"),
            )
        })?;
    Ok(Candidate {
        name: requirement.name().to_string(),
        normalized: requirement.normalized().to_string(),
        version,
        source: CandidateSource::Direct(source.clone()),
        requires_python: None,
        artifact: Some(Artifact {
            filename,
            url: reference,
            sha256: String::new(),
        }),
    })
}

/// Parses the version segment out of a wheel or sdist filename.
fn version_from_filename(filename: &str, normalized: &str) -> Option<Version> {
    let stem = filename
        .strip_suffix(".whl")
        .or_else(|| filename.strip_suffix(".tar.gz"))
        .or_else(|| filename.strip_suffix(".zip"))?;
    let parts: Vec<&str> = stem.split('-').collect();
    for index in 1..parts.len() {
        if normalize_name(&parts[..index].join("-")) == normalized {
            if let Ok(version) = Version::from_str(parts[index]) {
                return Some(version);
            }
        }
    }
    parts
        .get(1)
        .and_then(|candidate| Version::from_str(candidate).ok())
}

/// Sorts `requires_dist` entries into the unconditional set and per-extra
/// buckets, stripping the `extra == "…"` clause from bucketed markers.
fn bucket_requires(requires_dist: &[String], package: &str) -> DependencyMetadata {
    let mut metadata = DependencyMetadata::default();
    for spec in requires_dist {
        let (base, marker) = match spec.split_once(';') {
            Some((base, marker)) => (base.trim(), Some(marker.trim())),
            None => (spec.trim(), None),
        };
        let Some(marker) = marker else {
            push_parsed(&mut metadata.requires, base, package);
            continue;
        };
        if !marker_mentions_extra(marker) {
            push_parsed(&mut metadata.requires, spec, package);
            continue;
        }
        let (extras, rest) = split_extra_marker(marker);
        let rebuilt = match rest {
            Some(rest) => format!("{base} ; {rest}"),
            None => base.to_string(),
        };
        for extra in extras {
            let bucket = metadata.extra_requires.entry(extra).or_default();
            push_parsed(bucket, &rebuilt, package);
        }
    }
    metadata
}

fn push_parsed(bucket: &mut Vec<Requirement>, spec: &str, package: &str) {
    match Requirement::parse(spec) {
        Ok(requirement) => bucket.push(requirement),
        Err(err) => {
            warn!(package = %package, spec = %spec, error = %err, "requires_dist_entry_skipped");
        }
    }
}

fn marker_mentions_extra(marker: &str) -> bool {
    marker
        .split(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
        .any(|token| token == "extra")
}

/// Splits an `and`-joined marker into the extra names it gates on and the
/// remaining clauses.
fn split_extra_marker(marker: &str) -> (Vec<String>, Option<String>) {
    let mut extras = Vec::new();
    let mut rest = Vec::new();
    for segment in marker.split(" and ") {
        let clause = segment
            .trim()
            .trim_start_matches('(')
            .trim_end_matches(')')
            .trim();
        match extra_name(clause) {
            Some(extra) => extras.push(extra),
            None => rest.push(clause.to_string()),
        }
    }
    let rest = if rest.is_empty() {
        None
    } else {
        Some(rest.join(" and "))
    };
    (extras, rest)
}

fn extra_name(clause: &str) -> Option<String> {
    let remainder = clause.strip_prefix("extra")?.trim_start();
    let remainder = remainder.strip_prefix("==")?.trim();
    let quoted = remainder
        .strip_prefix('"')
        .and_then(|value| value.strip_suffix('"'))
        .or_else(|| {
            remainder
                .strip_prefix('\'')
                .and_then(|value| value.strip_suffix('\''))
        })?;
    Some(quoted.to_ascii_lowercase())
}
