pub mod analysis;
pub mod hash;
pub mod io;
pub mod types;

pub use analysis::{target_packages, validate_lock_closure, ClosureBreak, ClosureViolation};
pub use hash::{content_hash, validate};
pub use io::{load_lockfile, parse_lockfile, render_lockfile, write_lockfile, LockfileError};
pub use types::{LockedArtifact, LockedPackage, Lockfile, LOCK_VERSION};

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::repository::{EnvironmentFacts, ReleaseSpec, StaticRepository};
    use crate::requirement::Requirement;
    use crate::resolver::{resolve, ResolveOptions};

    fn parse_all(specs: &[&str]) -> Vec<Requirement> {
        specs
            .iter()
            .map(|spec| Requirement::parse(spec).unwrap())
            .collect()
    }

    fn demo_repo() -> StaticRepository {
        let mut repo = StaticRepository::default();
        repo.add(ReleaseSpec::new("demo", "1.0.0").requires(&["idna>=2"]));
        repo.add(ReleaseSpec::new("idna", "3.6"));
        repo.add(ReleaseSpec::new("pytz", "2024.1"));
        repo
    }

    fn lock_for(roots: &[&str]) -> Lockfile {
        let requirements = parse_all(roots);
        let env = EnvironmentFacts::testing("3.11.4");
        let graph = resolve(
            &requirements,
            &demo_repo(),
            &env,
            &ResolveOptions::default(),
        )
        .expect("fixture resolves");
        Lockfile::from_graph(&graph, &requirements, ">=3.9")
    }

    #[test]
    fn round_trips_byte_for_byte() {
        let lock = lock_for(&["demo>=1"]);
        let rendered = render_lockfile(&lock);
        let parsed = parse_lockfile(&rendered).unwrap();
        assert_eq!(parsed, lock);
        assert_eq!(render_lockfile(&parsed), rendered);
    }

    #[test]
    fn resolving_twice_writes_identical_bytes() {
        let first = render_lockfile(&lock_for(&["demo>=1"]));
        let second = render_lockfile(&lock_for(&["demo>=1"]));
        assert_eq!(first, second);
    }

    #[test]
    fn load_reports_missing_lockfile() {
        let dir = tempdir().unwrap();
        let err = load_lockfile(&dir.path().join("pyrite.lock")).unwrap_err();
        assert!(matches!(err, LockfileError::Missing(_)));
    }

    #[test]
    fn write_then_load_preserves_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pyrite.lock");
        let lock = lock_for(&["demo>=1"]);
        write_lockfile(&path, &lock).unwrap();
        let loaded = load_lockfile(&path).unwrap();
        assert_eq!(loaded, lock);
        assert_eq!(loaded.requires_python, ">=3.9");
        assert!(loaded.package("idna").is_some());
    }

    #[test]
    fn adding_a_requirement_makes_the_lock_stale() {
        let lock = lock_for(&["demo>=1"]);
        let original = parse_all(&["demo>=1"]);
        assert!(validate(&original, &lock));

        let grown = parse_all(&["demo>=1", "pytz"]);
        assert!(!validate(&grown, &lock), "old lock must read as stale");

        let relocked = lock_for(&["demo>=1", "pytz"]);
        assert!(relocked.package("pytz").is_some());
        assert!(validate(&grown, &relocked));
    }

    #[test]
    fn closure_holds_for_a_fresh_resolution() {
        let lock = lock_for(&["demo>=1"]);
        let env = EnvironmentFacts::testing("3.11.4");
        assert!(validate_lock_closure(&lock, &env).is_empty());
    }

    #[test]
    fn closure_violations_name_the_hole() {
        let mut lock = lock_for(&["demo>=1"]);
        lock.packages.retain(|package| package.name != "idna");
        let env = EnvironmentFacts::testing("3.11.4");
        let violations = validate_lock_closure(&lock, &env);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].package, "demo");
        assert_eq!(violations[0].reason, ClosureBreak::MissingDependency);
    }

    #[test]
    fn marker_gated_entries_leave_the_target_set() {
        let mut lock = lock_for(&["demo>=1"]);
        for package in &mut lock.packages {
            if package.name == "idna" {
                package.marker = Some(r#"sys_platform == "win32""#.to_string());
            }
        }
        let env = EnvironmentFacts::testing("3.11.4");
        let targets = target_packages(&lock, &env);
        assert!(targets.iter().all(|package| package.name != "idna"));
        assert!(targets.iter().any(|package| package.name == "demo"));
    }
}
