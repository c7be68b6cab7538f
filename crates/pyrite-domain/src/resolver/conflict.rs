use std::fmt;

/// One requirement participating in a conflict, traced back to the root
/// that introduced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictLink {
    /// Canonical form of the conflicting requirement.
    pub requirement: String,
    /// Provenance from the root inward, e.g. `["<root>", "legacy==1.0.0"]`.
    pub path: Vec<String>,
}

impl ConflictLink {
    #[must_use]
    pub fn via(&self) -> String {
        self.path.join(" -> ")
    }
}

/// Unsatisfiable constraints. Never retried; carries the minimal chain of
/// requirements that contradict each other, each traced to its root.
#[derive(Clone, Debug)]
pub struct ResolutionError {
    pub package: String,
    pub links: Vec<ConflictLink>,
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "unable to resolve `{}`: conflicting requirements",
            self.package
        )?;
        for link in &self.links {
            writeln!(f, "  {} (via {})", link.requirement, link.via())?;
        }
        Ok(())
    }
}

impl std::error::Error for ResolutionError {}
