use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};

use pyrite_domain::{discover_project_root, CancelToken, ProjectSnapshot};

use crate::config::{ConfigStore, GlobalOptions};
use crate::python::{
    discover_interpreters, probe_interpreter, select_interpreter, Environment,
    InterpreterSelector,
};
use crate::repository::PyPiRepository;

/// Per-invocation state: global flags, the merged two-scope config, and
/// the cancellation token. Built once in `main` and threaded into every
/// command; nothing here is read ambiently.
pub struct CommandContext {
    pub global: GlobalOptions,
    project_root: Option<PathBuf>,
    config: ConfigStore,
    cancel: CancelToken,
}

impl CommandContext {
    /// Discovers the enclosing project (if any) and loads both config
    /// scopes.
    ///
    /// # Errors
    /// Returns an error when the working directory cannot be inspected or
    /// a config file is malformed.
    pub fn new(global: GlobalOptions) -> Result<Self> {
        let project_root = discover_project_root()?;
        let config = ConfigStore::load(project_root.as_deref())?;
        Ok(Self {
            global,
            project_root,
            config,
            cancel: CancelToken::new(),
        })
    }

    #[must_use]
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Reads the current project snapshot.
    ///
    /// # Errors
    /// Returns an error when no project encloses the working directory.
    pub fn snapshot(&self) -> Result<ProjectSnapshot> {
        let root = self
            .project_root
            .as_deref()
            .ok_or_else(|| anyhow!(
                "no Python project found; expected a pyproject.toml with a [project] table"
            ))?;
        ProjectSnapshot::read_from(root)
    }

    #[must_use]
    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ConfigStore {
        &mut self.config
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Network use is on unless `PYRITE_OFFLINE` disables it.
    #[must_use]
    pub fn is_online(&self) -> bool {
        match std::env::var("PYRITE_OFFLINE") {
            Ok(value) => {
                let lowered = value.to_ascii_lowercase();
                matches!(lowered.as_str(), "" | "0" | "false" | "no" | "off")
            }
            Err(_) => true,
        }
    }

    /// Index backend honoring the `pypi.url` config key.
    ///
    /// # Errors
    /// Returns an error when the configured index URL is invalid.
    pub fn repository(&self) -> Result<PyPiRepository> {
        PyPiRepository::new(self.config.get("pypi.url"), self.is_online())
    }

    /// Binds the project to an interpreter and its package directory.
    /// Selection order: manifest `[tool.pyrite].python`, then the
    /// `python.path` / `python.version` config keys, then the newest
    /// discovered interpreter.
    ///
    /// # Errors
    /// Returns an error when no interpreter matches or probing fails.
    pub fn environment(&self, snapshot: &ProjectSnapshot) -> Result<Environment> {
        let selector = if let Some(raw) = &snapshot.python_override {
            InterpreterSelector::parse(raw)
        } else if let Some(path) = self.config.get("python.path") {
            InterpreterSelector::Path(PathBuf::from(path))
        } else if let Some(version) = self.config.get("python.version") {
            InterpreterSelector::Version(version.to_string())
        } else {
            InterpreterSelector::Default
        };
        let discovered = discover_interpreters()?;
        let selected = select_interpreter(&discovered, &selector)?;
        let interpreter = probe_interpreter(&selected.path)?;
        Ok(Environment::new(&snapshot.root, interpreter))
    }
}
