use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use pep440_rs::{Version, VersionSpecifiers};
use pep508_rs::{MarkerEnvironment, StringVersion};
use serde::Deserialize;
use serde_json::from_slice;

use pyrite_domain::EnvironmentFacts;

use super::discovery::EnvironmentError;

const MARKER_SCRIPT: &str = r#"import json, os, platform, sys
impl_name = getattr(sys.implementation, "name", "cpython")
data = {
    "implementation_name": impl_name,
    "implementation_version": platform.python_version(),
    "os_name": os.name,
    "platform_machine": platform.machine(),
    "platform_python_implementation": platform.python_implementation(),
    "platform_release": platform.release(),
    "platform_system": platform.system(),
    "platform_version": platform.version(),
    "python_full_version": platform.python_version(),
    "python_version": f"{sys.version_info[0]}.{sys.version_info[1]}",
    "sys_platform": sys.platform,
}
print(json.dumps(data))
"#;

/// A probed interpreter: path, concrete version, and the marker facts the
/// resolver evaluates conditional requirements against.
#[derive(Clone, Debug)]
pub struct Interpreter {
    pub path: PathBuf,
    pub version: Version,
    pub markers: MarkerEnvironment,
}

impl Interpreter {
    #[must_use]
    pub fn major_minor(&self) -> String {
        let rendered = self.version.to_string();
        let mut parts = rendered.splitn(3, '.');
        let major = parts.next().unwrap_or("0");
        let minor = parts.next().unwrap_or("0");
        format!("{major}.{minor}")
    }

    /// An interpreter value for tests, never probed.
    ///
    /// # Panics
    /// Panics when `full_version` is not a valid PEP 440 version.
    #[must_use]
    pub fn testing(full_version: &str) -> Self {
        let facts = EnvironmentFacts::testing(full_version);
        Self {
            path: PathBuf::from("/usr/bin/python3"),
            version: facts.python_version.clone(),
            markers: facts.markers,
        }
    }
}

/// Probes `python` once for its version and marker environment.
///
/// # Errors
/// Returns an error when the interpreter cannot be invoked or its payload
/// is malformed.
pub fn probe_interpreter(python: &Path) -> Result<Interpreter> {
    let payload: MarkerEnvPayload = probe_python(python, MARKER_SCRIPT, "marker environment")?;
    let version = Version::from_str(&payload.python_full_version).map_err(|err| {
        anyhow!(
            "`{}` is not a valid interpreter version: {err}",
            payload.python_full_version
        )
    })?;
    let markers = payload.into_marker_environment()?;
    Ok(Interpreter {
        path: python.to_path_buf(),
        version,
        markers,
    })
}

fn probe_python<T>(python: &Path, script: &str, guide: &str) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let output = Command::new(python)
        .arg("-c")
        .arg(script)
        .output()
        .with_context(|| format!("failed to probe {guide} via {}", python.display()))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("python {guide} probe failed: {stderr}");
    }
    from_slice(&output.stdout).context(format!("invalid {guide} payload"))
}

#[derive(Deserialize)]
struct MarkerEnvPayload {
    implementation_name: String,
    implementation_version: String,
    os_name: String,
    platform_machine: String,
    platform_python_implementation: String,
    platform_release: String,
    platform_system: String,
    platform_version: String,
    python_full_version: String,
    python_version: String,
    sys_platform: String,
}

impl MarkerEnvPayload {
    fn into_marker_environment(self) -> Result<MarkerEnvironment> {
        Ok(MarkerEnvironment {
            implementation_name: self.implementation_name,
            implementation_version: string_version(
                &self.implementation_version,
                "implementation_version",
            )?,
            os_name: self.os_name,
            platform_machine: self.platform_machine,
            platform_python_implementation: self.platform_python_implementation,
            platform_release: self.platform_release,
            platform_system: self.platform_system,
            platform_version: self.platform_version,
            python_full_version: string_version(&self.python_full_version, "python_full_version")?,
            python_version: string_version(&self.python_version, "python_version")?,
            sys_platform: self.sys_platform,
        })
    }
}

fn string_version(value: &str, field: &str) -> Result<StringVersion> {
    StringVersion::from_str(value)
        .map_err(|err| anyhow!("`{value}` is not a valid PEP 440 version for `{field}`: {err}"))
}

/// A selected interpreter bound to its isolated package location. The
/// package directory derives deterministically from major.minor, so each
/// interpreter line gets its own package set.
#[derive(Clone, Debug)]
pub struct Environment {
    pub interpreter: Interpreter,
    pub project_root: PathBuf,
    pub packages_dir: PathBuf,
}

impl Environment {
    #[must_use]
    pub fn new(project_root: &Path, interpreter: Interpreter) -> Self {
        let packages_dir = project_root
            .join("__pypackages__")
            .join(interpreter.major_minor())
            .join("lib");
        Self {
            interpreter,
            project_root: project_root.to_path_buf(),
            packages_dir,
        }
    }

    #[must_use]
    pub fn facts(&self) -> EnvironmentFacts {
        EnvironmentFacts::new(
            self.interpreter.version.clone(),
            self.interpreter.markers.clone(),
        )
    }

    /// Creates the package directory if needed.
    ///
    /// # Errors
    /// Returns [`EnvironmentError::PackagesDir`] on filesystem faults.
    pub fn ensure_packages_dir(&self) -> Result<(), EnvironmentError> {
        fs::create_dir_all(&self.packages_dir).map_err(|err| EnvironmentError::PackagesDir {
            path: self.packages_dir.display().to_string(),
            reason: err.to_string(),
        })
    }
}

/// A project `requires-python` range that excludes the selected
/// interpreter. Reported for the caller to act on; selecting the
/// interpreter is not itself an error.
#[must_use]
pub fn floor_violation(requires_python: &str, version: &Version) -> Option<String> {
    let specifiers = VersionSpecifiers::from_str(requires_python).ok()?;
    if specifiers.contains(version) {
        None
    } else {
        Some(format!(
            "interpreter {version} does not satisfy requires-python `{requires_python}`"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn packages_dir_derives_from_major_minor() {
        let dir = tempdir().unwrap();
        let env = Environment::new(dir.path(), Interpreter::testing("3.11.4"));
        assert_eq!(
            env.packages_dir,
            dir.path().join("__pypackages__").join("3.11").join("lib")
        );
    }

    #[test]
    fn same_interpreter_line_shares_a_package_set() {
        let dir = tempdir().unwrap();
        let a = Environment::new(dir.path(), Interpreter::testing("3.11.4"));
        let b = Environment::new(dir.path(), Interpreter::testing("3.11.9"));
        assert_eq!(a.packages_dir, b.packages_dir);
        let c = Environment::new(dir.path(), Interpreter::testing("3.12.0"));
        assert_ne!(a.packages_dir, c.packages_dir);
    }

    #[test]
    fn floor_violation_reports_an_excluded_interpreter() {
        let old = Version::from_str("2.7.18").unwrap();
        let violation = floor_violation(">=3.6", &old);
        assert!(violation.is_some_and(|message| message.contains(">=3.6")));

        let modern = Version::from_str("3.11.4").unwrap();
        assert!(floor_violation(">=3.6", &modern).is_none());
    }

    #[test]
    fn unparseable_floor_declarations_are_ignored() {
        let version = Version::from_str("3.11.4").unwrap();
        assert!(floor_violation("not-a-range", &version).is_none());
    }
}
