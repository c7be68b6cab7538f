use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use toml_edit::{Array, DocumentMut, Item, Table, Value as TomlValue};

use crate::requirement::{normalize_name, Requirement};

/// Format-preserving editor for a project's `pyproject.toml`.
#[derive(Debug)]
pub struct ManifestEditor {
    path: PathBuf,
    doc: DocumentMut,
}

#[derive(Debug, Default)]
pub struct ManifestAddReport {
    pub added: Vec<String>,
    pub updated: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ManifestRemoveReport {
    pub removed: Vec<String>,
}

impl ManifestEditor {
    /// Opens `path` and prepares it for manifest edits.
    ///
    /// # Errors
    /// Returns an error when the manifest cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(anyhow!("no pyproject.toml at {}", path.display()));
        }
        let contents = fs::read_to_string(&path)?;
        let doc: DocumentMut = contents.parse()?;
        Ok(Self { path, doc })
    }

    #[must_use]
    pub fn dependencies(&self) -> Vec<String> {
        self.doc
            .get("project")
            .and_then(Item::as_table)
            .and_then(|project| project.get("dependencies"))
            .and_then(Item::as_array)
            .map(|array| {
                array
                    .iter()
                    .filter_map(TomlValue::as_str)
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Inserts or replaces direct dependencies. Specs for a name already
    /// declared replace the existing entry.
    ///
    /// # Errors
    /// Returns an error on malformed specs or when the manifest cannot be
    /// written.
    pub fn add_specs(&mut self, specs: &[String]) -> Result<ManifestAddReport> {
        if specs.is_empty() {
            return Ok(ManifestAddReport::default());
        }
        let mut deps = self.dependencies();
        let mut report = ManifestAddReport::default();
        for spec in specs {
            let requirement = Requirement::parse(spec)?;
            let name = requirement.normalized().to_string();
            let canonical = requirement.canonical().to_string();
            let previous = deps
                .iter()
                .position(|existing| declared_name(existing) == name);
            match previous {
                Some(index) => {
                    if deps[index] != canonical {
                        deps[index] = canonical;
                        report.updated.push(name);
                    }
                }
                None => {
                    deps.push(canonical);
                    report.added.push(name);
                }
            }
        }
        if report.added.is_empty() && report.updated.is_empty() {
            return Ok(ManifestAddReport::default());
        }
        sort_and_dedupe(&mut deps);
        self.write_dependencies_array(&deps)?;
        self.save()?;
        Ok(report)
    }

    /// Removes direct dependencies by name.
    ///
    /// # Errors
    /// Returns an error when the manifest cannot be written.
    pub fn remove_specs(&mut self, names: &[String]) -> Result<ManifestRemoveReport> {
        let targets: BTreeSet<String> = names
            .iter()
            .map(|name| normalize_name(name))
            .filter(|name| !name.is_empty())
            .collect();
        if targets.is_empty() {
            return Ok(ManifestRemoveReport::default());
        }
        let mut deps = self.dependencies();
        let before = deps.len();
        let mut removed: Vec<String> = Vec::new();
        deps.retain(|spec| {
            let name = declared_name(spec);
            if targets.contains(&name) {
                removed.push(name);
                false
            } else {
                true
            }
        });
        if deps.len() == before {
            return Ok(ManifestRemoveReport::default());
        }
        removed.sort();
        removed.dedup();
        sort_and_dedupe(&mut deps);
        self.write_dependencies_array(&deps)?;
        self.save()?;
        Ok(ManifestRemoveReport { removed })
    }

    /// Records the selected interpreter under `[tool.pyrite].python`.
    ///
    /// # Errors
    /// Returns an error when the manifest cannot be written.
    ///
    /// # Panics
    /// Panics if the TOML structure for `[tool]` or `[tool.pyrite]` is
    /// invalid.
    pub fn set_python(&mut self, selector: &str) -> Result<bool> {
        let tool_entry = self.doc.entry("tool").or_insert(Item::Table(Table::new()));
        if !tool_entry.is_table() {
            *tool_entry = Item::Table(Table::new());
        }
        let tool_table = tool_entry.as_table_mut().expect("tool table");
        let pyrite_entry = tool_table
            .entry("pyrite")
            .or_insert(Item::Table(Table::new()));
        if !pyrite_entry.is_table() {
            *pyrite_entry = Item::Table(Table::new());
        }
        let pyrite_table = pyrite_entry.as_table_mut().expect("pyrite table");
        let current = pyrite_table
            .get("python")
            .and_then(Item::as_value)
            .and_then(TomlValue::as_str);
        if current == Some(selector) {
            return Ok(false);
        }
        pyrite_table.insert("python", Item::Value(TomlValue::from(selector)));
        self.save()?;
        Ok(true)
    }

    fn write_dependencies_array(&mut self, deps: &[String]) -> Result<()> {
        let project = self
            .doc
            .entry("project")
            .or_insert(Item::Table(Table::new()))
            .as_table_mut()
            .ok_or_else(|| anyhow!("[project] must be a table"))?;
        let mut array = Array::new();
        for dep in deps {
            array.push(TomlValue::from(dep.as_str()));
        }
        project.insert("dependencies", Item::Value(TomlValue::Array(array)));
        Ok(())
    }

    fn save(&self) -> Result<()> {
        fs::write(&self.path, self.doc.to_string())?;
        Ok(())
    }
}

fn declared_name(spec: &str) -> String {
    Requirement::parse(spec)
        .map(|requirement| requirement.normalized().to_string())
        .unwrap_or_default()
}

fn sort_and_dedupe(deps: &mut Vec<String>) {
    deps.sort_by(|a, b| declared_name(a).cmp(&declared_name(b)).then_with(|| a.cmp(b)));
    deps.dedup();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn editor_with(contents: &str) -> (tempfile::TempDir, ManifestEditor) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pyproject.toml");
        fs::write(&path, contents).unwrap();
        let editor = ManifestEditor::open(&path).unwrap();
        (dir, editor)
    }

    #[test]
    fn add_inserts_sorted_canonical_specs() {
        let (_dir, mut editor) =
            editor_with("[project]\nname = \"demo\"\ndependencies = [\"zlib-ng\"]\n");
        let report = editor
            .add_specs(&["Requests >= 2.19".to_string()])
            .unwrap();
        assert_eq!(report.added, vec!["requests"]);
        assert_eq!(editor.dependencies(), vec!["requests>=2.19", "zlib-ng"]);
    }

    #[test]
    fn add_replaces_an_existing_entry() {
        let (_dir, mut editor) =
            editor_with("[project]\nname = \"demo\"\ndependencies = [\"requests>=2\"]\n");
        let report = editor.add_specs(&["requests>=2.19".to_string()]).unwrap();
        assert!(report.added.is_empty());
        assert_eq!(report.updated, vec!["requests"]);
        assert_eq!(editor.dependencies(), vec!["requests>=2.19"]);
    }

    #[test]
    fn remove_matches_normalized_names() {
        let (_dir, mut editor) = editor_with(
            "[project]\nname = \"demo\"\ndependencies = [\"typing_extensions>=4\", \"pytz\"]\n",
        );
        let report = editor
            .remove_specs(&["Typing.Extensions".to_string()])
            .unwrap();
        assert_eq!(report.removed, vec!["typing-extensions"]);
        assert_eq!(editor.dependencies(), vec!["pytz"]);
    }

    #[test]
    fn remove_of_an_absent_name_reports_nothing() {
        let (_dir, mut editor) =
            editor_with("[project]\nname = \"demo\"\ndependencies = [\"pytz\"]\n");
        let report = editor.remove_specs(&["ghost".to_string()]).unwrap();
        assert!(report.removed.is_empty());
        assert_eq!(editor.dependencies(), vec!["pytz"]);
    }

    #[test]
    fn set_python_is_idempotent() {
        let (dir, mut editor) = editor_with("[project]\nname = \"demo\"\n");
        assert!(editor.set_python("3.11").unwrap());
        assert!(!editor.set_python("3.11").unwrap());
        let contents = fs::read_to_string(dir.path().join("pyproject.toml")).unwrap();
        assert!(contents.contains("[tool.pyrite]"));
        assert!(contents.contains("python = \"3.11\""));
    }

    #[test]
    fn add_rejects_malformed_specs() {
        let (_dir, mut editor) = editor_with("[project]\nname = \"demo\"\n");
        assert!(editor.add_specs(&["demo >== 1".to_string()]).is_err());
    }
}
