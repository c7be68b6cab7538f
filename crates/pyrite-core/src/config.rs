use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use toml_edit::{DocumentMut, Item, Table, Value as TomlValue};

/// Flags shared by every command, captured once from the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub verbose: u8,
    pub trace: bool,
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigScope {
    Project,
    Global,
}

impl ConfigScope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Global => "global",
        }
    }
}

/// Two-scope layered key-value store: project values (versioned with the
/// project in `.pyrite.toml`) override global ones
/// (`~/.config/pyrite/config.toml`). Built once per invocation and
/// threaded explicitly; nothing reads it ambiently.
#[derive(Debug, Default)]
pub struct ConfigStore {
    project_path: Option<PathBuf>,
    global_path: PathBuf,
    project: BTreeMap<String, String>,
    global: BTreeMap<String, String>,
}

impl ConfigStore {
    /// Loads both scopes; either file may be absent.
    ///
    /// # Errors
    /// Returns an error when an existing config file cannot be parsed.
    pub fn load(project_root: Option<&Path>) -> Result<Self> {
        let global_path = global_config_path()?;
        let project_path = project_root.map(|root| root.join(".pyrite.toml"));
        let global = read_scope(&global_path)?;
        let project = match &project_path {
            Some(path) => read_scope(path)?,
            None => BTreeMap::new(),
        };
        Ok(Self {
            project_path,
            global_path,
            project,
            global,
        })
    }

    /// Looks a key up, project scope first.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.scoped(key).map(|(value, _)| value)
    }

    #[must_use]
    pub fn scoped(&self, key: &str) -> Option<(&str, ConfigScope)> {
        if let Some(value) = self.project.get(key) {
            return Some((value, ConfigScope::Project));
        }
        self.global
            .get(key)
            .map(|value| (value.as_str(), ConfigScope::Global))
    }

    /// Merged view of both scopes, with the winning scope per key.
    #[must_use]
    pub fn entries(&self) -> BTreeMap<String, (String, ConfigScope)> {
        let mut merged: BTreeMap<String, (String, ConfigScope)> = self
            .global
            .iter()
            .map(|(key, value)| (key.clone(), (value.clone(), ConfigScope::Global)))
            .collect();
        for (key, value) in &self.project {
            merged.insert(key.clone(), (value.clone(), ConfigScope::Project));
        }
        merged
    }

    /// Writes a key to one scope only.
    ///
    /// # Errors
    /// Returns an error when there is no project for project scope, or the
    /// file cannot be written.
    pub fn set(&mut self, key: &str, value: &str, scope: ConfigScope) -> Result<()> {
        match scope {
            ConfigScope::Project => {
                let path = self
                    .project_path
                    .clone()
                    .ok_or_else(|| anyhow!("no project here to hold project-scope config"))?;
                write_scope_key(&path, key, value)?;
                self.project.insert(key.to_string(), value.to_string());
            }
            ConfigScope::Global => {
                write_scope_key(&self.global_path.clone(), key, value)?;
                self.global.insert(key.to_string(), value.to_string());
            }
        }
        Ok(())
    }
}

/// Global scope location; `PYRITE_CONFIG_DIR` overrides the platform
/// config directory.
fn global_config_path() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("PYRITE_CONFIG_DIR") {
        return Ok(PathBuf::from(dir).join("config.toml"));
    }
    let base = dirs_next::config_dir().ok_or_else(|| anyhow!("no user config directory"))?;
    Ok(base.join("pyrite").join("config.toml"))
}

fn read_scope(path: &Path) -> Result<BTreeMap<String, String>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let contents = fs::read_to_string(path)?;
    let doc: DocumentMut = contents
        .parse()
        .with_context(|| format!("failed to parse {}", path.display()))?;
    let mut entries = BTreeMap::new();
    flatten_table(doc.as_table(), "", &mut entries);
    Ok(entries)
}

/// Dotted keys address nested tables: `python.path` lives under
/// `[python]` as `path`.
fn flatten_table(table: &Table, prefix: &str, entries: &mut BTreeMap<String, String>) {
    for (key, item) in table {
        let full = if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        };
        match item {
            Item::Value(value) => {
                if let Some(rendered) = render_value(value) {
                    entries.insert(full, rendered);
                }
            }
            Item::Table(nested) => flatten_table(nested, &full, entries),
            _ => {}
        }
    }
}

fn render_value(value: &TomlValue) -> Option<String> {
    match value {
        TomlValue::String(formatted) => Some(formatted.value().clone()),
        TomlValue::Integer(formatted) => Some(formatted.value().to_string()),
        TomlValue::Boolean(formatted) => Some(formatted.value().to_string()),
        TomlValue::Float(formatted) => Some(formatted.value().to_string()),
        _ => None,
    }
}

fn write_scope_key(path: &Path, key: &str, value: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let contents = if path.exists() {
        fs::read_to_string(path)?
    } else {
        String::new()
    };
    let mut doc: DocumentMut = contents
        .parse()
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let mut segments: Vec<&str> = key.split('.').collect();
    let leaf = segments.pop().ok_or_else(|| anyhow!("empty config key"))?;
    if leaf.is_empty() || segments.iter().any(|segment| segment.is_empty()) {
        return Err(anyhow!("invalid config key `{key}`"));
    }
    let mut table = doc.as_table_mut();
    for segment in segments {
        let entry = table.entry(segment).or_insert(Item::Table(Table::new()));
        if !entry.is_table() {
            *entry = Item::Table(Table::new());
        }
        table = entry.as_table_mut().expect("just ensured a table");
        table.set_implicit(true);
    }
    table.insert(leaf, Item::Value(TomlValue::from(value)));
    fs::write(path, doc.to_string())?;
    Ok(())
}
