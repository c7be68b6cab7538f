use std::fs;
use std::path::{Path, PathBuf};

use toml_edit::{Array, ArrayOfTables, DocumentMut, Item, Table, Value as TomlValue};

use super::types::{LockedArtifact, LockedPackage, Lockfile, LOCK_VERSION};

#[derive(Debug, thiserror::Error)]
pub enum LockfileError {
    #[error("lockfile not found at {0}")]
    Missing(PathBuf),
    #[error("failed to parse lockfile: {0}")]
    Malformed(String),
    #[error("failed to access lockfile: {0}")]
    Io(#[from] std::io::Error),
}

/// Renders the canonical lockfile document: entries sorted by name, every
/// table in a fixed field order, no clock data. Rendering a parsed
/// lockfile reproduces its bytes exactly.
#[must_use]
pub fn render_lockfile(lock: &Lockfile) -> String {
    let mut doc = DocumentMut::new();
    doc.insert("version", Item::Value(TomlValue::from(lock.version)));

    let mut metadata = Table::new();
    metadata.insert(
        "content_hash",
        Item::Value(TomlValue::from(lock.content_hash.clone())),
    );
    doc.insert("metadata", Item::Table(metadata));

    let mut python = Table::new();
    python.insert(
        "requirement",
        Item::Value(TomlValue::from(lock.requires_python.clone())),
    );
    doc.insert("python", Item::Table(python));

    let mut ordered = lock.packages.clone();
    ordered.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.version.cmp(&b.version)));
    let mut packages = ArrayOfTables::new();
    for package in &ordered {
        let mut table = Table::new();
        table.insert("name", Item::Value(TomlValue::from(package.name.clone())));
        table.insert(
            "version",
            Item::Value(TomlValue::from(package.version.clone())),
        );
        if let Some(source) = &package.source {
            table.insert("source", Item::Value(TomlValue::from(source.clone())));
        }
        if let Some(marker) = &package.marker {
            table.insert("marker", Item::Value(TomlValue::from(marker.clone())));
        }
        if !package.requires.is_empty() {
            let mut requires = Array::new();
            for requirement in &package.requires {
                requires.push(TomlValue::from(requirement.as_str()));
            }
            table.insert("requires", Item::Value(TomlValue::Array(requires)));
        }
        if let Some(artifact) = &package.artifact {
            let mut artifact_table = Table::new();
            artifact_table.insert(
                "filename",
                Item::Value(TomlValue::from(artifact.filename.clone())),
            );
            artifact_table.insert("url", Item::Value(TomlValue::from(artifact.url.clone())));
            artifact_table.insert(
                "sha256",
                Item::Value(TomlValue::from(artifact.sha256.clone())),
            );
            table.insert("artifact", Item::Table(artifact_table));
        }
        packages.push(table);
    }
    doc.insert("package", Item::ArrayOfTables(packages));

    doc.to_string()
}

/// Parses lockfile text back into the in-memory form.
///
/// # Errors
/// Returns [`LockfileError::Malformed`] on invalid TOML.
pub fn parse_lockfile(contents: &str) -> Result<Lockfile, LockfileError> {
    let doc: DocumentMut = contents
        .parse()
        .map_err(|err: toml_edit::TomlError| LockfileError::Malformed(err.to_string()))?;

    let version = doc
        .get("version")
        .and_then(Item::as_integer)
        .unwrap_or(LOCK_VERSION);
    let content_hash = doc
        .get("metadata")
        .and_then(Item::as_table)
        .and_then(|metadata| metadata.get("content_hash"))
        .and_then(Item::as_str)
        .unwrap_or_default()
        .to_string();
    let requires_python = doc
        .get("python")
        .and_then(Item::as_table)
        .and_then(|python| python.get("requirement"))
        .and_then(Item::as_str)
        .unwrap_or_default()
        .to_string();

    let mut packages = Vec::new();
    if let Some(tables) = doc.get("package").and_then(Item::as_array_of_tables) {
        for table in tables {
            packages.push(parse_package(table));
        }
    }

    Ok(Lockfile {
        version,
        content_hash,
        requires_python,
        packages,
    })
}

fn parse_package(table: &Table) -> LockedPackage {
    let string_field = |key: &str| {
        table
            .get(key)
            .and_then(Item::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let optional_field = |key: &str| {
        table
            .get(key)
            .and_then(Item::as_str)
            .map(ToString::to_string)
    };
    let requires = table
        .get("requires")
        .and_then(Item::as_array)
        .map(|array| {
            array
                .iter()
                .filter_map(TomlValue::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default();
    let artifact = table
        .get("artifact")
        .and_then(Item::as_table)
        .map(|artifact| LockedArtifact {
            filename: artifact
                .get("filename")
                .and_then(Item::as_str)
                .unwrap_or_default()
                .to_string(),
            url: artifact
                .get("url")
                .and_then(Item::as_str)
                .unwrap_or_default()
                .to_string(),
            sha256: artifact
                .get("sha256")
                .and_then(Item::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    LockedPackage {
        name: string_field("name"),
        version: string_field("version"),
        source: optional_field("source"),
        marker: optional_field("marker"),
        requires,
        artifact,
    }
}

/// Loads the lockfile at `path`.
///
/// # Errors
/// [`LockfileError::Missing`] when absent; `Malformed`/`Io` otherwise.
pub fn load_lockfile(path: &Path) -> Result<Lockfile, LockfileError> {
    if !path.exists() {
        return Err(LockfileError::Missing(path.to_path_buf()));
    }
    let contents = fs::read_to_string(path)?;
    parse_lockfile(&contents)
}

/// Writes the canonical rendering of `lock` to `path`.
///
/// # Errors
/// Returns [`LockfileError::Io`] when the file cannot be written.
pub fn write_lockfile(path: &Path, lock: &Lockfile) -> Result<(), LockfileError> {
    fs::write(path, render_lockfile(lock))?;
    Ok(())
}
