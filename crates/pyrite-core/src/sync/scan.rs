use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use pyrite_domain::normalize_name;

/// One installed package as observed on disk. Re-scanned on every sync,
/// never cached across invocations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstalledRecord {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
}

/// Reads the `*.dist-info` records under a package directory, sorted by
/// name. A missing directory is an empty environment, not an error.
///
/// # Errors
/// Returns an error when an existing directory cannot be read.
pub fn scan_installed(packages_dir: &Path) -> Result<Vec<InstalledRecord>> {
    if !packages_dir.exists() {
        return Ok(Vec::new());
    }
    let mut records = Vec::new();
    for entry in fs::read_dir(packages_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(dir_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let Some(stem) = dir_name.strip_suffix(".dist-info") else {
            continue;
        };
        let Some((name, version)) = stem.rsplit_once('-') else {
            debug!(record = %dir_name, "unparseable_dist_info_skipped");
            continue;
        };
        records.push(InstalledRecord {
            name: normalize_name(name),
            version: version.to_string(),
            path,
        });
    }
    records.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_directory_scans_empty() {
        let dir = tempdir().unwrap();
        let records = scan_installed(&dir.path().join("absent")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn dist_info_records_parse_name_and_version() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("Demo_Pkg-1.0.0.dist-info")).unwrap();
        fs::create_dir_all(dir.path().join("idna-3.6.dist-info")).unwrap();
        fs::create_dir_all(dir.path().join("idna")).unwrap();
        fs::write(dir.path().join("stray.txt"), "x").unwrap();

        let records = scan_installed(dir.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "demo-pkg");
        assert_eq!(records[0].version, "1.0.0");
        assert_eq!(records[1].name, "idna");
    }
}
