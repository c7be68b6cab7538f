use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use pep440_rs::Version;
use tracing::debug;
use which::which;

use super::environment::probe_interpreter;

#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error("no interpreter matching `{0}` was found")]
    NoMatchingInterpreter(String),
    #[error("no python interpreter found; set PYRITE_PYTHON or install python3")]
    NoInterpreter,
    #[error("failed to inspect interpreter {path}: {reason}")]
    Probe { path: String, reason: String },
    #[error("failed to prepare package directory {path}: {reason}")]
    PackagesDir { path: String, reason: String },
}

/// One interpreter found on this machine, already probed for its version.
#[derive(Clone, Debug)]
pub struct DiscoveredInterpreter {
    pub path: PathBuf,
    pub version: Version,
}

impl DiscoveredInterpreter {
    #[must_use]
    pub fn major_minor(&self) -> String {
        let rendered = self.version.to_string();
        let mut parts = rendered.splitn(3, '.');
        let major = parts.next().unwrap_or("0");
        let minor = parts.next().unwrap_or("0");
        format!("{major}.{minor}")
    }
}

/// How the caller names an interpreter: an explicit path, a version
/// string matched on major.minor, or the default (newest discovered).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InterpreterSelector {
    Default,
    Version(String),
    Path(PathBuf),
}

impl InterpreterSelector {
    /// A selector containing a path separator or naming an existing file
    /// is a path; everything else is a version string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Default;
        }
        if trimmed.contains(std::path::MAIN_SEPARATOR) || Path::new(trimmed).exists() {
            return Self::Path(PathBuf::from(trimmed));
        }
        Self::Version(trimmed.to_string())
    }
}

const WELL_KNOWN_NAMES: &[&str] = &[
    "python3",
    "python",
    "python3.13",
    "python3.12",
    "python3.11",
    "python3.10",
    "python3.9",
    "python3.8",
    "python3.7",
    "python3.6",
    "python2.7",
];

/// Probes every interpreter reachable from `PATH` (plus the
/// `PYRITE_PYTHON` override), newest version first.
///
/// # Errors
/// Returns an error only when the filesystem cannot be consulted;
/// unprobeable candidates are skipped with a debug log.
pub fn discover_interpreters() -> Result<Vec<DiscoveredInterpreter>, EnvironmentError> {
    let mut seen: BTreeSet<PathBuf> = BTreeSet::new();
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Ok(explicit) = std::env::var("PYRITE_PYTHON") {
        candidates.push(PathBuf::from(explicit));
    }
    for name in WELL_KNOWN_NAMES {
        if let Ok(path) = which(name) {
            candidates.push(path);
        }
    }

    let mut discovered = Vec::new();
    for path in candidates {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
        if !seen.insert(canonical) {
            continue;
        }
        match probe_interpreter(&path) {
            Ok(interpreter) => discovered.push(DiscoveredInterpreter {
                path: interpreter.path,
                version: interpreter.version,
            }),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "interpreter_probe_failed");
            }
        }
    }
    discovered.sort_by(|a, b| b.version.cmp(&a.version));
    Ok(discovered)
}

/// Picks one interpreter from `discovered` per the selector contract: a
/// version string matches on equal major.minor (or an exact full
/// version); default takes the newest.
///
/// # Errors
/// [`EnvironmentError::NoMatchingInterpreter`] when a version selector
/// matches nothing, [`EnvironmentError::NoInterpreter`] when nothing was
/// discovered at all.
pub fn select_interpreter(
    discovered: &[DiscoveredInterpreter],
    selector: &InterpreterSelector,
) -> Result<DiscoveredInterpreter, EnvironmentError> {
    match selector {
        InterpreterSelector::Default => discovered
            .first()
            .cloned()
            .ok_or(EnvironmentError::NoInterpreter),
        InterpreterSelector::Version(requested) => {
            let exact = Version::from_str(requested).ok();
            discovered
                .iter()
                .find(|interpreter| {
                    interpreter.major_minor() == *requested
                        || exact
                            .as_ref()
                            .is_some_and(|version| interpreter.version == *version)
                })
                .cloned()
                .ok_or_else(|| EnvironmentError::NoMatchingInterpreter(requested.clone()))
        }
        InterpreterSelector::Path(path) => {
            // An explicit path is authoritative; it only needs probing.
            let interpreter =
                probe_interpreter(path).map_err(|err| EnvironmentError::Probe {
                    path: path.display().to_string(),
                    reason: err.to_string(),
                })?;
            Ok(DiscoveredInterpreter {
                path: interpreter.path,
                version: interpreter.version,
            })
        }
    }
}
