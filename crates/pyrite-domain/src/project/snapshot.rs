use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use toml_edit::{DocumentMut, Item};

use crate::requirement::{ParseError, Requirement};

pub const DEFAULT_PYTHON_REQUIREMENT: &str = ">=3.9";

/// Read-only view of a project's manifest at one instant.
#[derive(Clone, Debug)]
pub struct ProjectSnapshot {
    pub root: PathBuf,
    pub manifest_path: PathBuf,
    pub lock_path: PathBuf,
    pub name: String,
    pub python_requirement: String,
    pub dependencies: Vec<String>,
    pub python_override: Option<String>,
}

impl ProjectSnapshot {
    /// Reads the project containing the current working directory.
    ///
    /// # Errors
    /// Returns an error when no project is found or the manifest is
    /// malformed.
    pub fn read_current() -> Result<Self> {
        let root = current_project_root()?;
        Self::read_from(&root)
    }

    /// Reads the project rooted at `root`.
    ///
    /// # Errors
    /// Returns an error when `pyproject.toml` is absent or malformed.
    pub fn read_from(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let manifest_path = root.join("pyproject.toml");
        if !manifest_path.exists() {
            return Err(anyhow!(
                "no pyproject.toml at {}",
                manifest_path.display()
            ));
        }
        let contents = fs::read_to_string(&manifest_path)?;
        let doc: DocumentMut = contents
            .parse()
            .with_context(|| format!("failed to parse {}", manifest_path.display()))?;
        let project = doc
            .get("project")
            .and_then(Item::as_table)
            .ok_or_else(|| anyhow!("pyproject missing [project] table"))?;
        let name = project
            .get("name")
            .and_then(Item::as_str)
            .ok_or_else(|| anyhow!("pyproject missing [project].name"))?
            .to_string();
        let python_requirement = project
            .get("requires-python")
            .and_then(Item::as_str)
            .map_or_else(|| DEFAULT_PYTHON_REQUIREMENT.to_string(), ToString::to_string);
        let dependencies = project
            .get("dependencies")
            .and_then(Item::as_array)
            .map(|array| {
                array
                    .iter()
                    .filter_map(toml_edit::Value::as_str)
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let python_override = doc
            .get("tool")
            .and_then(Item::as_table)
            .and_then(|tool| tool.get("pyrite"))
            .and_then(Item::as_table)
            .and_then(|pyrite| pyrite.get("python"))
            .and_then(Item::as_str)
            .map(ToString::to_string);
        Ok(Self {
            root: root.to_path_buf(),
            manifest_path,
            lock_path: root.join("pyrite.lock"),
            name,
            python_requirement,
            dependencies,
            python_override,
        })
    }

    /// Parses the declared dependencies into requirement values.
    ///
    /// # Errors
    /// Returns the first [`ParseError`] among the declared specifiers.
    pub fn requirements(&self) -> Result<Vec<Requirement>, ParseError> {
        self.dependencies.iter().map(|spec| Requirement::parse(spec)).collect()
    }
}

/// Finds the project root for the working directory.
///
/// # Errors
/// Returns an error when no enclosing project exists.
pub fn current_project_root() -> Result<PathBuf> {
    match discover_project_root()? {
        Some(root) => Ok(root),
        None => Err(anyhow!(
            "no Python project found; expected a pyproject.toml with a [project] table"
        )),
    }
}

/// Walks up from the working directory looking for a lockfile or a
/// `pyproject.toml` declaring `[project]`.
///
/// # Errors
/// Returns an error when the working directory cannot be inspected.
pub fn discover_project_root() -> Result<Option<PathBuf>> {
    let mut dir = env::current_dir().context("unable to determine working directory")?;
    loop {
        if dir.join("pyrite.lock").exists() {
            return Ok(Some(dir));
        }
        let manifest = dir.join("pyproject.toml");
        if manifest.exists() && manifest_has_project(&manifest)? {
            return Ok(Some(dir));
        }
        if !dir.pop() {
            break;
        }
    }
    Ok(None)
}

fn manifest_has_project(path: &Path) -> Result<bool> {
    let contents = fs::read_to_string(path)?;
    let doc: DocumentMut = contents.parse()?;
    Ok(doc.get("project").and_then(Item::as_table).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_manifest(root: &Path, contents: &str) {
        fs::write(root.join("pyproject.toml"), contents).unwrap();
    }

    #[test]
    fn reads_name_dependencies_and_python_floor() {
        let dir = tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"[project]
name = "demo-app"
requires-python = ">=3.10"
dependencies = ["demo>=1", "pytz"]

[tool.pyrite]
python = "3.11"
"#,
        );
        let snapshot = ProjectSnapshot::read_from(dir.path()).unwrap();
        assert_eq!(snapshot.name, "demo-app");
        assert_eq!(snapshot.python_requirement, ">=3.10");
        assert_eq!(snapshot.dependencies, vec!["demo>=1", "pytz"]);
        assert_eq!(snapshot.python_override.as_deref(), Some("3.11"));
        assert_eq!(snapshot.lock_path, dir.path().join("pyrite.lock"));
        assert_eq!(snapshot.requirements().unwrap().len(), 2);
    }

    #[test]
    fn python_requirement_defaults_when_undeclared() {
        let dir = tempdir().unwrap();
        write_manifest(dir.path(), "[project]\nname = \"demo\"\n");
        let snapshot = ProjectSnapshot::read_from(dir.path()).unwrap();
        assert_eq!(snapshot.python_requirement, DEFAULT_PYTHON_REQUIREMENT);
        assert!(snapshot.dependencies.is_empty());
    }

    #[test]
    fn missing_manifest_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(ProjectSnapshot::read_from(dir.path()).is_err());
    }

    #[test]
    fn malformed_dependency_surfaces_a_parse_error() {
        let dir = tempdir().unwrap();
        write_manifest(
            dir.path(),
            "[project]\nname = \"demo\"\ndependencies = [\"demo >== 1\"]\n",
        );
        let snapshot = ProjectSnapshot::read_from(dir.path()).unwrap();
        assert!(snapshot.requirements().is_err());
    }
}
