use sha2::{Digest, Sha256};

use crate::requirement::Requirement;

use super::types::Lockfile;

/// Stable hash over the sorted canonical strings of the input
/// requirements. Input order never matters; any textual variation that
/// survives canonicalization does.
#[must_use]
pub fn content_hash(requirements: &[Requirement]) -> String {
    let mut lines: Vec<&str> = requirements
        .iter()
        .map(Requirement::canonical)
        .collect();
    lines.sort_unstable();
    lines.dedup();
    let mut hasher = Sha256::new();
    for line in lines {
        hasher.update(line.as_bytes());
        hasher.update([b'\n']);
    }
    format!("sha256:{:x}", hasher.finalize())
}

/// True iff `lock` was produced from exactly this requirement set.
/// `false` is the normal "stale" signal, never an error; callers may
/// always re-resolve and overwrite.
#[must_use]
pub fn validate(current_requirements: &[Requirement], lock: &Lockfile) -> bool {
    content_hash(current_requirements) == lock.content_hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(specs: &[&str]) -> Vec<Requirement> {
        specs
            .iter()
            .map(|spec| Requirement::parse(spec).unwrap())
            .collect()
    }

    #[test]
    fn hash_ignores_declaration_order() {
        let forward = parse_all(&["demo>=1", "pytz"]);
        let backward = parse_all(&["pytz", "demo>=1"]);
        assert_eq!(content_hash(&forward), content_hash(&backward));
    }

    #[test]
    fn hash_ignores_cosmetic_spelling() {
        let spelled = parse_all(&["Demo >= 1"]);
        let canonical = parse_all(&["demo>=1"]);
        assert_eq!(content_hash(&spelled), content_hash(&canonical));
    }

    #[test]
    fn adding_a_requirement_changes_the_hash() {
        let original = parse_all(&["demo>=1"]);
        let extended = parse_all(&["demo>=1", "pytz"]);
        assert_ne!(content_hash(&original), content_hash(&extended));
    }

    #[test]
    fn validate_is_a_boolean_staleness_signal() {
        let requirements = parse_all(&["demo>=1"]);
        let lock = Lockfile {
            content_hash: content_hash(&requirements),
            ..Lockfile::default()
        };
        assert!(validate(&requirements, &lock));
        let grown = parse_all(&["demo>=1", "pytz"]);
        assert!(!validate(&grown, &lock));
    }
}
