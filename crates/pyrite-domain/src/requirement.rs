use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use pep440_rs::{Version, VersionSpecifiers};
use pep508_rs::{MarkerEnvironment, Requirement as PepRequirement, VersionOrUrl};

/// Canonical package-name form: lowercase, `_` and `.` folded to `-`.
pub fn normalize_name(name: &str) -> String {
    name.to_ascii_lowercase().replace(['_', '.'], "-")
}

#[derive(Debug, thiserror::Error)]
#[error("invalid requirement `{input}`: {reason}")]
pub struct ParseError {
    pub input: String,
    pub reason: String,
}

impl ParseError {
    pub(crate) fn new(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// A pinned reference that bypasses version search entirely.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirectSource {
    Url(String),
    Path(String),
}

impl DirectSource {
    fn from_reference(reference: &str) -> Self {
        if let Some(path) = reference.strip_prefix("file://") {
            Self::Path(path.to_string())
        } else {
            Self::Url(reference.to_string())
        }
    }

    #[must_use]
    pub fn reference(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::Path(path) => format!("file://{path}"),
        }
    }
}

impl fmt::Display for DirectSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reference())
    }
}

/// One parsed dependency declaration.
///
/// Immutable once parsed; equality and hashing are defined on the canonical
/// string form, so `demo[B,a]>=1` and `Demo[a,b] >= 1` compare equal.
#[derive(Clone, Debug)]
pub struct Requirement {
    name: String,
    normalized: String,
    extras: Vec<String>,
    specifiers: VersionSpecifiers,
    marker: Option<String>,
    source: Option<DirectSource>,
    canonical: String,
    pep: PepRequirement,
}

impl Requirement {
    /// Parses a PEP 508 dependency specifier into its canonical form.
    ///
    /// # Errors
    /// Returns a [`ParseError`] on malformed specifier syntax.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let trimmed = input.trim();
        let pep = PepRequirement::from_str(trimmed)
            .map_err(|err| ParseError::new(trimmed, err.to_string()))?;

        let name = pep.name.to_string();
        let normalized = normalize_name(pep.name.as_ref());
        let mut extras: Vec<String> = pep
            .extras
            .iter()
            .map(|extra| extra.to_string().to_ascii_lowercase())
            .collect();
        extras.sort();
        extras.dedup();

        let (specifiers, source) = match pep.version_or_url.as_ref() {
            Some(VersionOrUrl::VersionSpecifier(specifiers)) => {
                let reparsed = VersionSpecifiers::from_str(&specifiers.to_string())
                    .map_err(|err| ParseError::new(trimmed, err.to_string()))?;
                (reparsed, None)
            }
            Some(VersionOrUrl::Url(url)) => (
                VersionSpecifiers::from_iter(std::iter::empty()),
                Some(DirectSource::from_reference(&url.to_string())),
            ),
            None => (VersionSpecifiers::from_iter(std::iter::empty()), None),
        };
        let marker = pep.marker.as_ref().map(|marker| marker.to_string());

        let canonical = render_canonical(&normalized, &extras, &specifiers, source.as_ref(), marker.as_deref());
        Ok(Self {
            name,
            normalized,
            extras,
            specifiers,
            marker,
            source,
            canonical,
            pep,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    #[must_use]
    pub fn extras(&self) -> &[String] {
        &self.extras
    }

    #[must_use]
    pub fn specifiers(&self) -> &VersionSpecifiers {
        &self.specifiers
    }

    #[must_use]
    pub fn marker(&self) -> Option<&str> {
        self.marker.as_deref()
    }

    #[must_use]
    pub fn source(&self) -> Option<&DirectSource> {
        self.source.as_ref()
    }

    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.source.is_some()
    }

    /// The canonical string used for deduplication and content hashing.
    #[must_use]
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Evaluates the conditional predicate against an interpreter environment.
    /// A requirement without a marker applies everywhere.
    #[must_use]
    pub fn applies(&self, env: &MarkerEnvironment) -> bool {
        self.pep.evaluate_markers(env, &[])
    }

    /// True when `version` satisfies every declared constraint (all ANDed).
    /// An empty constraint list accepts any version.
    #[must_use]
    pub fn accepts(&self, version: &Version) -> bool {
        self.specifiers.contains(version)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl PartialEq for Requirement {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for Requirement {}

impl Hash for Requirement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

fn render_canonical(
    normalized: &str,
    extras: &[String],
    specifiers: &VersionSpecifiers,
    source: Option<&DirectSource>,
    marker: Option<&str>,
) -> String {
    let mut out = String::from(normalized);
    if !extras.is_empty() {
        out.push('[');
        out.push_str(&extras.join(","));
        out.push(']');
    }
    if let Some(source) = source {
        out.push_str(" @ ");
        out.push_str(&source.reference());
    } else {
        let rendered: Vec<String> = specifiers.iter().map(ToString::to_string).collect();
        out.push_str(&rendered.join(","));
    }
    if let Some(marker) = marker {
        out.push_str(" ; ");
        out.push_str(marker);
    }
    out
}

/// Evaluates a standalone marker expression, as stored in lockfile entries.
///
/// # Errors
/// Returns a [`ParseError`] when the marker text is not valid PEP 508 syntax.
pub fn marker_applies(marker: &str, env: &MarkerEnvironment) -> Result<bool, ParseError> {
    let probe = format!("pyrite-marker-probe ; {marker}");
    let requirement = Requirement::parse(&probe)
        .map_err(|err| ParseError::new(marker, err.reason))?;
    Ok(requirement.applies(env))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::EnvironmentFacts;

    #[test]
    fn canonical_form_is_order_insensitive() {
        let left = Requirement::parse("Demo[B,a] >= 1.0, <2").unwrap();
        let right = Requirement::parse("demo[a,b]>=1.0,<2").unwrap();
        assert_eq!(left, right);
        assert_eq!(left.canonical(), "demo[a,b]>=1.0,<2");
    }

    #[test]
    fn normalizes_separators_in_names() {
        let req = Requirement::parse("Typing_Extensions==4.8.0").unwrap();
        assert_eq!(req.normalized(), "typing-extensions");
        assert_eq!(req.name(), "Typing_Extensions");
    }

    #[test]
    fn rejects_malformed_specifiers() {
        let err = Requirement::parse("demo >== 1.0").unwrap_err();
        assert!(err.to_string().contains("demo"));
    }

    #[test]
    fn direct_reference_is_pinned() {
        let req =
            Requirement::parse("demo @ https://example.invalid/demo-1.0.0-py3-none-any.whl")
                .unwrap();
        assert!(req.is_direct());
        assert!(req.specifiers().iter().next().is_none());
        assert!(req.canonical().contains("@ https://example.invalid/"));
    }

    #[test]
    fn file_references_become_paths() {
        let req = Requirement::parse("demo @ file:///srv/wheels/demo-1.0.0-py3-none-any.whl")
            .unwrap();
        match req.source() {
            Some(DirectSource::Path(path)) => {
                assert!(path.ends_with("demo-1.0.0-py3-none-any.whl"));
            }
            other => panic!("expected path source, got {other:?}"),
        }
    }

    #[test]
    fn markers_follow_the_interpreter_version() {
        let facts = EnvironmentFacts::testing("3.11.4");
        let req = Requirement::parse(r#"demo>=1 ; python_version >= "3.10""#).unwrap();
        assert!(req.applies(&facts.markers));
        let req = Requirement::parse(r#"demo>=1 ; python_version < "3.0""#).unwrap();
        assert!(!req.applies(&facts.markers));
    }

    #[test]
    fn accepts_checks_every_constraint() {
        let req = Requirement::parse("demo>=1.0,<2").unwrap();
        assert!(req.accepts(&"1.5".parse().unwrap()));
        assert!(!req.accepts(&"2.0".parse().unwrap()));
        let unconstrained = Requirement::parse("demo").unwrap();
        assert!(unconstrained.accepts(&"0.0.1".parse().unwrap()));
    }

    #[test]
    fn standalone_marker_evaluation_round_trips() {
        let facts = EnvironmentFacts::testing("3.11.4");
        assert!(marker_applies(r#"python_version >= "3.10""#, &facts.markers).unwrap());
        assert!(!marker_applies(r#"sys_platform == "win32""#, &facts.markers).unwrap());
        assert!(marker_applies("not a marker", &facts.markers).is_err());
    }
}
