use std::fs;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use sha2::{Digest, Sha256};
use tracing::debug;

use pyrite_domain::{LockedArtifact, LockedPackage};

use crate::python::Environment;

use super::scan::InstalledRecord;

/// Package-level mutation seam. The synchronizer drives this; tests
/// substitute an in-memory implementation.
pub trait Installer: Sync {
    /// Materializes one locked package into the environment. Must be
    /// transactional: on failure no installed record may remain.
    ///
    /// # Errors
    /// Returns the package-level cause; the synchronizer isolates it.
    fn install(&self, package: &LockedPackage, env: &Environment) -> Result<()>;

    /// Removes one installed package and its record.
    ///
    /// # Errors
    /// Returns the package-level cause; the synchronizer isolates it.
    fn remove(&self, record: &InstalledRecord, env: &Environment) -> Result<()>;
}

/// Real installer: fetches the locked artifact, verifies its content
/// hash, and unpacks the wheel into the package directory via a staging
/// directory so records only ever describe completed installs.
pub struct WheelInstaller {
    client: reqwest::blocking::Client,
}

impl WheelInstaller {
    /// # Errors
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(format!("pyrite/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self { client })
    }

    fn fetch_artifact(&self, package: &LockedPackage, artifact: &LockedArtifact) -> Result<Vec<u8>> {
        let bytes = if let Some(path) = artifact.url.strip_prefix("file://") {
            fs::read(path).with_context(|| format!("failed to read {path}"))?
        } else {
            let response = self
                .client
                .get(&artifact.url)
                .send()
                .and_then(reqwest::blocking::Response::error_for_status)
                .with_context(|| format!("failed to download {}", artifact.url))?;
            let mut bytes = Vec::new();
            let mut reader = response;
            reader
                .read_to_end(&mut bytes)
                .with_context(|| format!("failed to download {}", artifact.url))?;
            bytes
        };
        if !artifact.sha256.is_empty() {
            let digest = format!("{:x}", Sha256::digest(&bytes));
            if digest != artifact.sha256 {
                bail!(
                    "hash mismatch for {}: expected {}, got {digest}",
                    package.name,
                    artifact.sha256
                );
            }
        }
        Ok(bytes)
    }
}

impl Installer for WheelInstaller {
    fn install(&self, package: &LockedPackage, env: &Environment) -> Result<()> {
        let artifact = package
            .artifact
            .as_ref()
            .ok_or_else(|| anyhow!("no artifact recorded for {}", package.name))?;
        if !artifact.filename.ends_with(".whl") {
            bail!(
                "{} is locked to a source distribution; only wheels can be installed",
                package.name
            );
        }
        let bytes = self.fetch_artifact(package, artifact)?;

        let staging = tempfile::Builder::new()
            .prefix(".pyrite-stage-")
            .tempdir_in(&env.packages_dir)
            .context("failed to create staging directory")?;
        unpack_wheel(&bytes, staging.path())
            .with_context(|| format!("failed to unpack {}", artifact.filename))?;
        ensure_dist_info(staging.path(), package)?;

        // Entries move into place only after the whole archive unpacked.
        for entry in fs::read_dir(staging.path())? {
            let entry = entry?;
            let destination = env.packages_dir.join(entry.file_name());
            if destination.exists() {
                if destination.is_dir() {
                    fs::remove_dir_all(&destination)?;
                } else {
                    fs::remove_file(&destination)?;
                }
            }
            fs::rename(entry.path(), &destination)?;
        }
        debug!(package = %package.name, version = %package.version, "package_installed");
        Ok(())
    }

    fn remove(&self, record: &InstalledRecord, env: &Environment) -> Result<()> {
        // The record directory goes last, so an interrupted removal still
        // reads as installed and can be retried.
        let import_name = record.name.replace('-', "_");
        let module_dir = env.packages_dir.join(&import_name);
        if module_dir.is_dir() {
            fs::remove_dir_all(&module_dir)?;
        }
        let module_file = env.packages_dir.join(format!("{import_name}.py"));
        if module_file.is_file() {
            fs::remove_file(&module_file)?;
        }
        if record.path.is_dir() {
            fs::remove_dir_all(&record.path)?;
        }
        debug!(package = %record.name, "package_removed");
        Ok(())
    }
}

fn unpack_wheel(bytes: &[u8], destination: &Path) -> Result<()> {
    let reader = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(reader)?;
    archive.extract(destination)?;
    Ok(())
}

/// Wheels always carry a dist-info directory; synthesize one for archives
/// that lack it so the install leaves a scannable record.
fn ensure_dist_info(staging: &Path, package: &LockedPackage) -> Result<()> {
    let expected = format!("{}-{}.dist-info", package.name, package.version);
    for entry in fs::read_dir(staging)? {
        let entry = entry?;
        if entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.ends_with(".dist-info"))
        {
            return Ok(());
        }
    }
    let dist_info = staging.join(expected);
    fs::create_dir_all(&dist_info)?;
    fs::write(
        dist_info.join("METADATA"),
        format!(
            "Metadata-Version: 2.1\nName: {}\nVersion: {}\n",
            package.name, package.version
        ),
    )?;
    Ok(())
}
